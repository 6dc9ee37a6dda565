//! Local filesystem object storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{ErrorCode, FolioError, FolioResult};
use crate::traits::{ByteStream, ObjectMetadata, ObjectStore};

const METADATA_SUFFIX: &str = ".meta.json";

/// Stores objects as files under a root directory, with metadata in a JSON
/// sidecar next to each object.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object path inside the root, rejecting escapes.
    fn resolve(&self, path: &str) -> FolioResult<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || !safe {
            return Err(FolioError::validation(format!("Invalid object path: {}", path)));
        }
        Ok(self.root.join(relative))
    }

    fn suffixed(object: &Path, suffix: &str) -> PathBuf {
        let mut name = object.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn metadata_path(object: &Path) -> PathBuf {
        Self::suffixed(object, METADATA_SUFFIX)
    }

    fn missing(path: &str) -> FolioError {
        FolioError::Storage {
            message: format!("Object not found: {}", path),
            code: ErrorCode::StoObjectMissing,
        }
    }
}

#[async_trait]
impl ObjectStore for LocalFsStore {
    async fn upload(
        &self,
        path: &str,
        content: &[u8],
        metadata: ObjectMetadata,
    ) -> FolioResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // write-then-rename so readers never see a partial object
        let staging = Self::suffixed(&target, ".partial");
        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(content).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&staging, &target).await?;

        let sidecar = serde_json::to_vec_pretty(&metadata)?;
        tokio::fs::write(Self::metadata_path(&target), sidecar).await?;

        debug!(path, bytes = content.len(), "Stored object");
        Ok(())
    }

    async fn stream(&self, path: &str) -> FolioResult<ByteStream> {
        let target = self.resolve(path)?;
        let file = match tokio::fs::File::open(&target).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Self::missing(path)),
            Err(e) => return Err(e.into()),
        };

        let stream = ReaderStream::new(file).map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(FolioError::from)
        });
        Ok(Box::pin(stream))
    }

    async fn metadata(&self, path: &str) -> FolioResult<ObjectMetadata> {
        let target = self.resolve(path)?;
        if !tokio::fs::try_exists(&target).await? {
            return Err(Self::missing(path));
        }
        match tokio::fs::read(Self::metadata_path(&target)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ObjectMetadata::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> FolioResult<bool> {
        let target = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&target).await?)
    }

    async fn delete(&self, path: &str) -> FolioResult<()> {
        let target = self.resolve(path)?;
        for file in [Self::metadata_path(&target), target] {
            match tokio::fs::remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());

        let mut metadata = ObjectMetadata::new();
        metadata.insert("content-type".to_string(), "application/epub+zip".to_string());
        store
            .upload("alice/abc.epub", b"PK\x03\x04 book bytes", metadata)
            .await
            .unwrap();

        assert!(store.exists("alice/abc.epub").await.unwrap());
        let bytes = store.download("alice/abc.epub").await.unwrap();
        assert_eq!(bytes, b"PK\x03\x04 book bytes");

        let metadata = store.metadata("alice/abc.epub").await.unwrap();
        assert_eq!(
            metadata.get("content-type").map(String::as_str),
            Some("application/epub+zip")
        );
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());

        assert!(!store.exists("nope.txt").await.unwrap());
        let err = store.download("nope.txt").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StoObjectMissing);
        assert!(store.metadata("nope.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_removes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        store.upload("a.txt", b"hello", ObjectMetadata::new()).await.unwrap();

        store.delete("a.txt").await.unwrap();
        assert!(!store.exists("a.txt").await.unwrap());
        assert!(!dir.path().join("a.txt.meta.json").exists());

        // deleting twice is fine
        tokio_test::assert_ok!(store.delete("a.txt").await);
    }

    #[tokio::test]
    async fn test_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFsStore::new(dir.path());
        assert!(store.upload("../evil", b"x", ObjectMetadata::new()).await.is_err());
        assert!(store.exists("/etc/passwd").await.is_err());
    }
}
