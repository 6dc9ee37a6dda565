//! Embedder trait and related types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{FolioError, FolioResult};

/// Core Embedder trait - all embedding providers implement this.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> FolioResult<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    ///
    /// Providers without native batching inherit this sequential fallback,
    /// which pauses between calls to stay under rate limits.
    async fn embed_batch(&self, texts: &[String]) -> FolioResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.batch_delay()).await;
            }
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the dimension of the embeddings.
    fn dimensions(&self) -> usize;

    /// Provider tag (e.g. "openai").
    fn provider_name(&self) -> &str;

    /// Get the model name.
    fn model_name(&self) -> &str;

    /// Pause between sequential calls in the fallback batch path.
    fn batch_delay(&self) -> Duration {
        Duration::from_millis(100)
    }
}

/// Check a vector against the dimensionality its provider declared.
pub fn ensure_dimensions(vector: &[f32], expected: usize) -> FolioResult<()> {
    if vector.len() != expected {
        return Err(FolioError::dimension_mismatch(expected, vector.len()));
    }
    Ok(())
}

/// Embedder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Model name/identifier.
    pub model: String,
    /// Embedding dimensions.
    #[serde(default = "default_embedding_dims")]
    pub embedding_dims: usize,
    /// API key (if not resolved per caller).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL for API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Pause between sequential embedding calls, in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_embedding_dims() -> usize {
    1536
}

fn default_batch_delay_ms() -> u64 {
    100
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            embedding_dims: default_embedding_dims(),
            api_key: None,
            base_url: None,
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

/// Embedder provider type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum EmbedderProvider {
    #[default]
    #[strum(to_string = "openai")]
    OpenAI,
    #[strum(to_string = "ollama", serialize = "local")]
    Ollama,
}

impl EmbedderProvider {
    /// Whether a stored credential is required to use this provider.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, EmbedderProvider::Ollama)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, text: &str) -> FolioResult<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn provider_name(&self) -> &str {
            "fixed"
        }

        fn model_name(&self) -> &str {
            "fixed-2"
        }

        fn batch_delay(&self) -> Duration {
            Duration::ZERO
        }
    }

    #[tokio::test]
    async fn test_default_batch_preserves_order() {
        let texts = vec!["a".to_string(), "abc".to_string(), "ab".to_string()];
        let vectors = FixedEmbedder.embed_batch(&texts).await.unwrap();
        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_ensure_dimensions() {
        assert!(ensure_dimensions(&[0.0, 1.0], 2).is_ok());
        assert!(ensure_dimensions(&[0.0], 2).is_err());
    }
}
