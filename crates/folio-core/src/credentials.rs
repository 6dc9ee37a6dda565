//! Credential resolvers.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::FolioResult;
use crate::traits::{CredentialResolver, ProviderCredential};

/// Reads provider keys from the process environment.
///
/// A caller-scoped variable (`FOLIO_<CALLER>_<PROVIDER>_API_KEY`) wins over
/// the provider-wide one (`<PROVIDER>_API_KEY`). Suitable for single-tenant
/// deployments and local development.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialResolver;

impl EnvCredentialResolver {
    pub fn new() -> Self {
        Self
    }

    fn env_key(part: &str) -> String {
        part.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect()
    }

    fn lookup(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(
        &self,
        caller_id: &str,
        provider: &str,
    ) -> FolioResult<Option<ProviderCredential>> {
        let provider_key = Self::env_key(provider);
        let scoped = format!("FOLIO_{}_{}_API_KEY", Self::env_key(caller_id), provider_key);
        let shared = format!("{}_API_KEY", provider_key);

        let Some(api_key) = Self::lookup(&scoped).or_else(|| Self::lookup(&shared)) else {
            return Ok(None);
        };

        let mut credential = ProviderCredential::new(api_key);
        if let Some(url) = Self::lookup(&format!("{}_BASE_URL", provider_key)) {
            credential = credential.with_base_url(url);
        }
        Ok(Some(credential))
    }
}

/// In-memory credentials keyed by (caller, provider).
#[derive(Default)]
pub struct StaticCredentialResolver {
    keys: HashMap<(String, String), (String, Option<String>)>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key for a caller and provider.
    pub fn with_key(
        mut self,
        caller_id: impl Into<String>,
        provider: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        self.keys.insert(
            (caller_id.into(), provider.into().to_lowercase()),
            (api_key.into(), None),
        );
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(
        &self,
        caller_id: &str,
        provider: &str,
    ) -> FolioResult<Option<ProviderCredential>> {
        let key = (caller_id.to_string(), provider.to_lowercase());
        Ok(self.keys.get(&key).map(|(api_key, base_url)| {
            let credential = ProviderCredential::new(api_key.clone());
            match base_url {
                Some(url) => credential.with_base_url(url.clone()),
                None => credential,
            }
        }))
    }
}
