//! OpenAI embedding provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use folio_core::error::{FolioError, FolioResult};
use folio_core::traits::{Embedder, EmbedderConfig};

#[cfg(feature = "openai")]
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateEmbeddingRequest, EmbeddingInput},
    Client,
};

/// OpenAI embedding provider.
pub struct OpenAIEmbedder {
    #[cfg(feature = "openai")]
    client: Client<OpenAIConfig>,
    config: EmbedderConfig,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder. The key comes from `config.api_key`.
    pub fn new(config: EmbedderConfig) -> FolioResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| FolioError::missing_credentials("openai"))?;

        #[cfg(feature = "openai")]
        let client = {
            let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
            if let Some(ref base_url) = config.base_url {
                openai_config = openai_config.with_api_base(base_url);
            }
            Client::with_config(openai_config)
        };
        #[cfg(not(feature = "openai"))]
        let _ = api_key;

        Ok(Self {
            #[cfg(feature = "openai")]
            client,
            config,
        })
    }

    /// Only the text-embedding-3 family accepts a dimensions override.
    fn requested_dimensions(&self) -> Option<u32> {
        self.config
            .model
            .starts_with("text-embedding-3")
            .then_some(self.config.embedding_dims as u32)
    }

    #[cfg(feature = "openai")]
    async fn create(&self, input: EmbeddingInput) -> FolioResult<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequest {
            model: self.config.model.clone(),
            input,
            dimensions: self.requested_dimensions(),
            ..Default::default()
        };

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

#[cfg(feature = "openai")]
fn map_openai_error(err: OpenAIError) -> FolioError {
    match err {
        OpenAIError::ApiError(api) => {
            match api.code.as_deref().or(api.r#type.as_deref()).unwrap_or_default() {
                "invalid_api_key" | "invalid_authentication" => {
                    FolioError::authentication(api.message)
                }
                "rate_limit_exceeded" => FolioError::rate_limit(api.message),
                "insufficient_quota" => FolioError::quota_exhausted(api.message),
                _ => FolioError::embedding(format!("OpenAI embedding error: {}", api.message)),
            }
        }
        OpenAIError::Reqwest(e) => FolioError::api(format!("OpenAI request failed: {}", e)),
        other => FolioError::embedding(format!("OpenAI embedding error: {}", other)),
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    #[cfg(feature = "openai")]
    async fn embed(&self, text: &str) -> FolioResult<Vec<f32>> {
        self.create(EmbeddingInput::String(text.to_string()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FolioError::embedding("No embedding returned"))
    }

    #[cfg(not(feature = "openai"))]
    async fn embed(&self, _text: &str) -> FolioResult<Vec<f32>> {
        Err(FolioError::Configuration(
            "OpenAI feature not enabled. Enable the 'openai' feature.".to_string(),
        ))
    }

    #[cfg(feature = "openai")]
    #[instrument(skip(self, texts), fields(count = texts.len(), model = %self.config.model))]
    async fn embed_batch(&self, texts: &[String]) -> FolioResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.create(EmbeddingInput::StringArray(texts.to_vec())).await
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.config.batch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_only_for_v3_models() {
        let v3 = OpenAIEmbedder::new(EmbedderConfig {
            api_key: Some("sk-test".to_string()),
            embedding_dims: 512,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(v3.requested_dimensions(), Some(512));

        let ada = OpenAIEmbedder::new(EmbedderConfig {
            model: "text-embedding-ada-002".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ada.requested_dimensions(), None);
    }

    #[test]
    fn test_requires_key() {
        let err = OpenAIEmbedder::new(EmbedderConfig::default()).err().unwrap();
        assert!(err.is_credential_error());
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_quota_errors_are_not_retried() {
        let error = |code: &str| {
            OpenAIError::ApiError(
                serde_json::from_value(serde_json::json!({
                    "message": "request refused",
                    "type": code,
                    "param": null,
                    "code": code,
                }))
                .unwrap(),
            )
        };

        let quota = map_openai_error(error("insufficient_quota"));
        assert!(quota.is_credential_error());
        assert!(!quota.is_retryable());
        assert!(map_openai_error(error("rate_limit_exceeded")).is_retryable());
    }
}
