//! Factory for creating embedding providers.

use std::sync::Arc;

use secrecy::ExposeSecret;

use folio_core::error::{FolioError, FolioResult};
use folio_core::traits::{CredentialResolver, Embedder, EmbedderConfig, EmbedderProvider};

use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAIEmbedder;

/// Factory for creating embedding providers.
pub struct EmbedderFactory;

impl EmbedderFactory {
    /// Create an embedder from the given configuration.
    pub fn create(
        provider: EmbedderProvider,
        config: EmbedderConfig,
    ) -> FolioResult<Arc<dyn Embedder>> {
        match provider {
            EmbedderProvider::OpenAI => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
            EmbedderProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        }
    }

    /// Parse a provider tag ("openai", "ollama", "local").
    pub fn parse_provider(tag: &str) -> FolioResult<EmbedderProvider> {
        tag.parse::<EmbedderProvider>()
            .map_err(|_| FolioError::UnsupportedProvider {
                provider: tag.to_string(),
            })
    }

    /// Create an embedder bound to `caller_id`'s stored credential.
    pub async fn for_caller(
        resolver: &dyn CredentialResolver,
        caller_id: &str,
        provider: EmbedderProvider,
        mut config: EmbedderConfig,
    ) -> FolioResult<Arc<dyn Embedder>> {
        if provider.requires_credential() {
            let tag = provider.to_string();
            let credential = resolver
                .resolve(caller_id, &tag)
                .await?
                .ok_or_else(|| FolioError::missing_credentials(&tag))?;
            config.api_key = Some(credential.api_key.expose_secret().to_string());
            if let Some(base_url) = credential.base_url {
                config.base_url = Some(base_url);
            }
        }
        Self::create(provider, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use folio_core::traits::ProviderCredential;
    use mockall::mock;

    mock! {
        Resolver {}

        #[async_trait]
        impl CredentialResolver for Resolver {
            async fn resolve(&self, caller_id: &str, provider: &str)
                -> FolioResult<Option<ProviderCredential>>;
        }
    }

    #[tokio::test]
    async fn test_for_caller() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_, _| Ok(Some(ProviderCredential::new("sk-test"))));

        let embedder = EmbedderFactory::for_caller(
            &resolver,
            "alice",
            EmbedderProvider::OpenAI,
            EmbedderConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(embedder.provider_name(), "openai");
        assert_eq!(embedder.dimensions(), 1536);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_, _| Ok(None));

        let result = EmbedderFactory::for_caller(
            &resolver,
            "alice",
            EmbedderProvider::OpenAI,
            EmbedderConfig::default(),
        )
        .await;
        assert!(result.err().unwrap().is_credential_error());
    }
}
