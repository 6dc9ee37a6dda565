//! Ollama embedding provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;
use url::Url;

use folio_core::error::{FolioError, FolioResult};
use folio_core::traits::{Embedder, EmbedderConfig};

#[cfg(feature = "ollama")]
use ollama_rs::{generation::embeddings::request::GenerateEmbeddingsRequest, Ollama};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama embedding provider. One request embeds a whole batch.
pub struct OllamaEmbedder {
    #[cfg(feature = "ollama")]
    client: Ollama,
    config: EmbedderConfig,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder.
    pub fn new(config: EmbedderConfig) -> FolioResult<Self> {
        let url = Url::parse(config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
            .map_err(|e| FolioError::Configuration(format!("Invalid Ollama URL: {}", e)))?;
        let host = format!("{}://{}", url.scheme(), url.host_str().unwrap_or("localhost"));
        let port = url.port().unwrap_or(11434);

        #[cfg(feature = "ollama")]
        let client = Ollama::new(host, port);
        #[cfg(not(feature = "ollama"))]
        let _ = (host, port);

        Ok(Self {
            #[cfg(feature = "ollama")]
            client,
            config,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> FolioResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FolioError::embedding("No embedding returned"))
    }

    #[cfg(feature = "ollama")]
    #[instrument(skip(self, texts), fields(count = texts.len(), model = %self.config.model))]
    async fn embed_batch(&self, texts: &[String]) -> FolioResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateEmbeddingsRequest::new(self.config.model.clone(), texts.to_vec().into());
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| FolioError::api(format!("Ollama embedding error: {}", e)))?;
        Ok(response.embeddings)
    }

    #[cfg(not(feature = "ollama"))]
    async fn embed_batch(&self, _texts: &[String]) -> FolioResult<Vec<Vec<f32>>> {
        Err(FolioError::Configuration(
            "Ollama feature not enabled. Enable the 'ollama' feature.".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dims
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn batch_delay(&self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_kept() {
        let embedder = OllamaEmbedder::new(EmbedderConfig {
            model: "nomic-embed-text".to_string(),
            embedding_dims: 768,
            base_url: Some("http://gpu-box:11434".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(embedder.dimensions(), 768);
        assert_eq!(embedder.model_name(), "nomic-embed-text");
        assert_eq!(embedder.batch_delay(), Duration::ZERO);

        let err = OllamaEmbedder::new(EmbedderConfig {
            base_url: Some("::".to_string()),
            ..Default::default()
        });
        assert!(matches!(err, Err(FolioError::Configuration(_))));
    }

    #[cfg(feature = "ollama")]
    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let embedder = OllamaEmbedder::new(EmbedderConfig {
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..Default::default()
        })
        .unwrap();
        let err = embedder.embed("hello").await.err().unwrap();
        assert!(err.is_retryable());
    }
}
