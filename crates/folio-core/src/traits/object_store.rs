//! Object storage trait for uploaded source files.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::FolioResult;

/// Object metadata stored next to the bytes.
pub type ObjectMetadata = HashMap<String, String>;

/// A stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = FolioResult<Vec<u8>>> + Send>>;

/// Storage for uploaded source documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes at `path`, replacing any existing object.
    async fn upload(&self, path: &str, content: &[u8], metadata: ObjectMetadata)
        -> FolioResult<()>;

    /// Read the whole object.
    async fn download(&self, path: &str) -> FolioResult<Vec<u8>> {
        let mut stream = self.stream(path).await?;
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer)
    }

    /// Read the object as a stream of chunks.
    async fn stream(&self, path: &str) -> FolioResult<ByteStream>;

    /// Metadata recorded at upload time.
    async fn metadata(&self, path: &str) -> FolioResult<ObjectMetadata>;

    async fn exists(&self, path: &str) -> FolioResult<bool>;

    async fn delete(&self, path: &str) -> FolioResult<()>;
}
