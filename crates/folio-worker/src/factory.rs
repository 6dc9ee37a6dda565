//! Wiring from configuration to providers and the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;

use folio_core::config::{EmbedderProviderConfig, LlmProviderConfig};
use folio_core::error::FolioResult;
use folio_core::traits::{CredentialResolver, Embedder, Llm, ProviderFactory, ProviderRequest};
use folio_core::{EnvCredentialResolver, FolioConfig, Orchestrator};
use folio_embeddings::EmbedderFactory;
use folio_llm::LlmFactory;

/// Builds the configured providers for each caller.
///
/// A request may name another provider or model; switching provider drops
/// the configured model and endpoint so the new provider's defaults apply.
pub struct ConfiguredProviders {
    llm: LlmProviderConfig,
    embedder: EmbedderProviderConfig,
    credentials: Arc<dyn CredentialResolver>,
}

impl ConfiguredProviders {
    pub fn new(config: &FolioConfig, credentials: Arc<dyn CredentialResolver>) -> Self {
        Self {
            llm: config.llm.clone(),
            embedder: config.embedder.clone(),
            credentials,
        }
    }
}

#[async_trait]
impl ProviderFactory for ConfiguredProviders {
    async fn llm(&self, request: &ProviderRequest) -> FolioResult<Arc<dyn Llm>> {
        let mut config = self.llm.config.clone();
        let provider = match request.provider.as_deref() {
            Some(tag) => {
                let provider = LlmFactory::parse_provider(tag)?;
                if provider != self.llm.provider {
                    config.model.clear();
                    config.base_url = None;
                }
                provider
            }
            None => self.llm.provider,
        };
        if let Some(model) = &request.model {
            config.model = model.clone();
        }

        LlmFactory::for_caller(self.credentials.as_ref(), &request.caller_id, provider, config)
            .await
    }

    async fn embedder(&self, request: &ProviderRequest) -> FolioResult<Arc<dyn Embedder>> {
        // embeddings stay on the configured space so vectors remain comparable
        EmbedderFactory::for_caller(
            self.credentials.as_ref(),
            &request.caller_id,
            self.embedder.provider,
            self.embedder.config.clone(),
        )
        .await
    }
}

/// Load configuration from `FOLIO_CONFIG` (if set) overlaid with `FOLIO_*`
/// environment variables.
pub fn load_config() -> FolioResult<FolioConfig> {
    let mut config = match std::env::var("FOLIO_CONFIG") {
        Ok(path) => FolioConfig::from_file(path)?,
        Err(_) => FolioConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

/// Create an orchestrator over SQLite and local storage, resolving provider
/// keys from the environment.
pub fn create_orchestrator(config: FolioConfig) -> FolioResult<Orchestrator> {
    let providers = Arc::new(ConfiguredProviders::new(
        &config,
        Arc::new(EnvCredentialResolver::new()),
    ));
    Orchestrator::with_sqlite(config, providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    use folio_core::traits::LlmProvider;
    use folio_core::StaticCredentialResolver;

    fn providers() -> ConfiguredProviders {
        let config = FolioConfig::builder()
            .llm(LlmProviderConfig {
                provider: LlmProvider::OpenAI,
                config: folio_core::LlmConfig {
                    model: "gpt-4o".to_string(),
                    ..Default::default()
                },
            })
            .build();
        let credentials = StaticCredentialResolver::new()
            .with_key("alice", "openai", "sk-alice")
            .with_key("alice", "anthropic", "sk-ant-alice");
        ConfiguredProviders::new(&config, Arc::new(credentials))
    }

    #[tokio::test]
    async fn test_default_provider_and_model_override() {
        let providers = providers();

        let llm = providers.llm(&ProviderRequest::new("alice")).await.unwrap();
        assert_eq!(llm.provider_name(), "openai");
        assert_eq!(llm.model_name(), "gpt-4o");

        let request = ProviderRequest::new("alice").with_model(Some("gpt-4o-mini".to_string()));
        let llm = providers.llm(&request).await.unwrap();
        assert_eq!(llm.model_name(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_switching_provider_uses_its_defaults() {
        let request = ProviderRequest::new("alice").with_provider(Some("claude".to_string()));
        let llm = providers().llm(&request).await.unwrap();
        assert_eq!(llm.provider_name(), "anthropic");
        assert_ne!(llm.model_name(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_unknown_caller_has_no_credentials() {
        let result = providers().llm(&ProviderRequest::new("mallory")).await;
        assert!(result.err().unwrap().is_credential_error());

        let embedder = providers().embedder(&ProviderRequest::new("alice")).await.unwrap();
        assert_eq!(embedder.provider_name(), "openai");
    }
}
