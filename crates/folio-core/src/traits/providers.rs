//! Per-caller provider resolution.
//!
//! Stages never hold a process-wide client. At stage start they ask a
//! [`ProviderFactory`] for an LLM or embedder bound to the caller, and the
//! factory asks a [`CredentialResolver`] for that caller's stored key.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use super::{Embedder, Llm};
use crate::error::FolioResult;

/// Which provider a stage run should use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderRequest {
    /// Identity whose credentials are used.
    pub caller_id: String,
    /// Provider tag; `None` means the configured default.
    pub provider: Option<String>,
    /// Model name; `None` means the provider default.
    pub model: Option<String>,
}

impl ProviderRequest {
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: Option<String>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// A stored provider credential.
#[derive(Debug)]
pub struct ProviderCredential {
    pub api_key: SecretString,
    /// Per-caller endpoint override (self-hosted gateways).
    pub base_url: Option<String>,
}

impl ProviderCredential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Looks up a caller's credential for a provider.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// `Ok(None)` when the caller has no credential for this provider.
    async fn resolve(&self, caller_id: &str, provider: &str)
        -> FolioResult<Option<ProviderCredential>>;
}

/// Builds providers for a stage run.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn llm(&self, request: &ProviderRequest) -> FolioResult<Arc<dyn Llm>>;

    async fn embedder(&self, request: &ProviderRequest) -> FolioResult<Arc<dyn Embedder>>;
}
