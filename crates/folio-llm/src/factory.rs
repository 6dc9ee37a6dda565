//! Factory for creating LLM providers.

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::debug;

use folio_core::error::{FolioError, FolioResult};
use folio_core::traits::{CredentialResolver, Llm, LlmConfig, LlmProvider};

use crate::anthropic::AnthropicLlm;
use crate::ollama::OllamaLlm;
use crate::openai::OpenAIProvider;

/// Factory for creating LLM providers.
pub struct LlmFactory;

impl LlmFactory {
    /// Create an LLM provider from the given configuration.
    pub fn create(provider: LlmProvider, config: LlmConfig) -> FolioResult<Arc<dyn Llm>> {
        match provider {
            LlmProvider::OpenAI => Ok(Arc::new(OpenAIProvider::new(config)?)),
            LlmProvider::Anthropic => Ok(Arc::new(AnthropicLlm::new(config)?)),
            LlmProvider::Ollama => Ok(Arc::new(OllamaLlm::new(config)?)),
        }
    }

    /// Parse a provider tag ("openai", "claude", "local", ...).
    pub fn parse_provider(tag: &str) -> FolioResult<LlmProvider> {
        tag.parse::<LlmProvider>().map_err(|_| FolioError::UnsupportedProvider {
            provider: tag.to_string(),
        })
    }

    /// Create a provider bound to `caller_id`'s stored credential.
    ///
    /// Providers that need a key fail with a credential error when the
    /// caller has none; a stored base URL overrides the configured one.
    pub async fn for_caller(
        resolver: &dyn CredentialResolver,
        caller_id: &str,
        provider: LlmProvider,
        mut config: LlmConfig,
    ) -> FolioResult<Arc<dyn Llm>> {
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

        debug!(caller_id, %provider, model = %config.model, "Building LLM for caller");
        Self::create(provider, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use folio_core::error::ErrorCode;
    use folio_core::traits::ProviderCredential;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Resolver {}

        #[async_trait]
        impl CredentialResolver for Resolver {
            async fn resolve(&self, caller_id: &str, provider: &str)
                -> FolioResult<Option<ProviderCredential>>;
        }
    }

    #[tokio::test]
    async fn test_for_caller_uses_stored_key() {
        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .with(eq("alice"), eq("anthropic"))
            .times(1)
            .returning(|_, _| Ok(Some(ProviderCredential::new("sk-ant-alice"))));

        let llm = LlmFactory::for_caller(
            &resolver,
            "alice",
            LlmProvider::Anthropic,
            LlmConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(llm.provider_name(), "anthropic");
    }

    #[tokio::test]
    async fn test_for_caller_without_key_is_credential_error() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().returning(|_, _| Ok(None));

        let err = LlmFactory::for_caller(&resolver, "bob", LlmProvider::OpenAI, LlmConfig::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::AuthMissingCredentials);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_local_provider_skips_resolver() {
        let mut resolver = MockResolver::new();
        resolver.expect_resolve().never();

        let llm = LlmFactory::for_caller(&resolver, "bob", LlmProvider::Ollama, LlmConfig::default())
            .await
            .unwrap();
        assert_eq!(llm.provider_name(), "ollama");
    }

    #[test]
    fn test_scene_prompt_per_provider() {
        use folio_core::prompts;

        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let full = prompts::scene_analysis_prompt("Arya ran.", Some("Chapter 1"));
        let compact = prompts::compact_scene_analysis_prompt("Arya ran.", Some("Chapter 1"));

        for (provider, expected) in [
            (LlmProvider::OpenAI, &full),
            (LlmProvider::Anthropic, &full),
            (LlmProvider::Ollama, &compact),
        ] {
            let llm = LlmFactory::create(provider, config.clone()).unwrap();
            assert_eq!(
                &llm.scene_analysis_prompt("Arya ran.", Some("Chapter 1")),
                expected,
                "{}",
                provider
            );
        }
    }

    #[test]
    fn test_parse_provider() {
        assert_eq!(LlmFactory::parse_provider("claude").unwrap(), LlmProvider::Anthropic);
        assert!(matches!(
            LlmFactory::parse_provider("gemini"),
            Err(FolioError::UnsupportedProvider { .. })
        ));
    }
}
