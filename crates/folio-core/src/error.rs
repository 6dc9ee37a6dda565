//! Error types for folio operations.
//!
//! This module provides the pipeline's error hierarchy with structured error
//! codes, suggestions for resolution, and the classification helpers the job
//! queues use to decide between retrying, failing fast and isolating a
//! single item.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for folio operations.
pub type FolioResult<T> = Result<T, FolioError>;

/// Main error type for all folio operations.
#[derive(Error, Debug)]
pub enum FolioError {
    /// Provider credentials are missing or were rejected.
    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// A referenced entity does not exist.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        entity_id: Option<String>,
    },

    /// The document is not in a state that allows the requested operation.
    #[error("Invalid state: {message}")]
    InvalidState { message: String, code: ErrorCode },

    /// Provider rate limit exceeded.
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        code: ErrorCode,
        retry_after: Option<u64>,
    },

    /// LLM operation failed.
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding generation failed.
    #[error("Embedding error: {message}")]
    Embedding {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Object storage operation failed.
    #[error("Storage error: {message}")]
    Storage { message: String, code: ErrorCode },

    /// Chapter extraction from the source document failed.
    #[error("Extraction error: {message}")]
    Extraction { message: String, code: ErrorCode },

    /// Job queue bookkeeping failed.
    #[error("Queue error: {message}")]
    Queue { message: String, code: ErrorCode },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network error.
    #[error("Network error: {message}")]
    Network {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Provider not supported.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Authentication (AUTH_xxx)
    AuthInvalidKey,
    AuthMissingCredentials,
    AuthQuotaExhausted,

    // Validation (VAL_xxx)
    ValInvalidInput,
    ValMissingField,
    ValDimensionMismatch,

    // Lookup (NF_xxx)
    DocumentNotFound,
    SceneNotFound,
    CharacterNotFound,
    JobNotFound,

    // State machine (STATE_xxx)
    StateInvalidTransition,
    StateDuplicateDocument,

    // Rate Limit (RATE_xxx)
    RateLimitExceeded,

    // LLM (LLM_xxx)
    LlmConnectionFailed,
    LlmGenerationFailed,
    LlmInvalidResponse,
    LlmUnhealthy,

    // Embedding (EMB_xxx)
    EmbConnectionFailed,
    EmbGenerationFailed,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Storage (STO_xxx)
    StoObjectMissing,
    StoOperationFailed,

    // Extraction (EXT_xxx)
    ExtUnsupportedFormat,
    ExtFailed,

    // Queue (QUE_xxx)
    QueOperationFailed,

    // Network (NET_xxx)
    NetTimeout,
    NetConnectionFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseMissingField,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthInvalidKey => "AUTH_001",
            ErrorCode::AuthMissingCredentials => "AUTH_002",
            ErrorCode::AuthQuotaExhausted => "AUTH_003",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValMissingField => "VAL_002",
            ErrorCode::ValDimensionMismatch => "VAL_003",
            ErrorCode::DocumentNotFound => "NF_001",
            ErrorCode::SceneNotFound => "NF_002",
            ErrorCode::CharacterNotFound => "NF_003",
            ErrorCode::JobNotFound => "NF_004",
            ErrorCode::StateInvalidTransition => "STATE_001",
            ErrorCode::StateDuplicateDocument => "STATE_002",
            ErrorCode::RateLimitExceeded => "RATE_001",
            ErrorCode::LlmConnectionFailed => "LLM_001",
            ErrorCode::LlmGenerationFailed => "LLM_002",
            ErrorCode::LlmInvalidResponse => "LLM_003",
            ErrorCode::LlmUnhealthy => "LLM_004",
            ErrorCode::EmbConnectionFailed => "EMB_001",
            ErrorCode::EmbGenerationFailed => "EMB_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::StoObjectMissing => "STO_001",
            ErrorCode::StoOperationFailed => "STO_002",
            ErrorCode::ExtUnsupportedFormat => "EXT_001",
            ErrorCode::ExtFailed => "EXT_002",
            ErrorCode::QueOperationFailed => "QUE_001",
            ErrorCode::NetTimeout => "NET_001",
            ErrorCode::NetConnectionFailed => "NET_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseMissingField => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl FolioError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an error for vectors whose dimensionality does not match.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        let mut details = HashMap::new();
        details.insert("expected".to_string(), expected.to_string());
        details.insert("actual".to_string(), actual.to_string());
        Self::Validation {
            message: format!(
                "Embedding dimension mismatch: expected {}, got {}",
                expected, actual
            ),
            code: ErrorCode::ValDimensionMismatch,
            details,
            suggestion: Some(
                "Regenerate embeddings with the same provider and model".to_string(),
            ),
        }
    }

    /// Create a document not found error.
    pub fn document_not_found(document_id: impl Into<String>) -> Self {
        let id = document_id.into();
        Self::NotFound {
            message: format!("Document with id '{}' not found", id),
            code: ErrorCode::DocumentNotFound,
            entity_id: Some(id),
        }
    }

    /// Create a scene not found error.
    pub fn scene_not_found(scene_id: impl Into<String>) -> Self {
        let id = scene_id.into();
        Self::NotFound {
            message: format!("Scene with id '{}' not found", id),
            code: ErrorCode::SceneNotFound,
            entity_id: Some(id),
        }
    }

    /// Create a character not found error.
    pub fn character_not_found(character_id: impl Into<String>) -> Self {
        let id = character_id.into();
        Self::NotFound {
            message: format!("Character with id '{}' not found", id),
            code: ErrorCode::CharacterNotFound,
            entity_id: Some(id),
        }
    }

    /// Create an invalid state transition error.
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            message: format!("Cannot move document from '{}' to '{}'", from, to),
            code: ErrorCode::StateInvalidTransition,
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
            code: ErrorCode::StateInvalidTransition,
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmGenerationFailed,
            source: None,
        }
    }

    /// Create an error for a provider that failed its health check.
    pub fn llm_unhealthy(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            code: ErrorCode::LlmUnhealthy,
            source: None,
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
            code: ErrorCode::EmbGenerationFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            code: ErrorCode::StoOperationFailed,
        }
    }

    /// Create an extraction error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
            code: ErrorCode::ExtFailed,
        }
    }

    /// Create a queue error.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            code: ErrorCode::QueOperationFailed,
        }
    }

    /// Create a network/API error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            code: ErrorCode::NetConnectionFailed,
            source: None,
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            code: ErrorCode::AuthInvalidKey,
            source: None,
        }
    }

    /// Create an error for a provider with no stored credential.
    pub fn missing_credentials(provider: impl Into<String>) -> Self {
        Self::Authentication {
            message: format!("No API key configured for provider '{}'", provider.into()),
            code: ErrorCode::AuthMissingCredentials,
            source: None,
        }
    }

    /// Create an error for an account out of credit. Not retried.
    pub fn quota_exhausted(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            code: ErrorCode::AuthQuotaExhausted,
            source: None,
        }
    }

    /// Create a rate limit error.
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
            code: ErrorCode::RateLimitExceeded,
            retry_after: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Authentication { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::InvalidState { code, .. } => *code,
            Self::RateLimit { code, .. } => *code,
            Self::Llm { code, .. } => *code,
            Self::Embedding { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Storage { code, .. } => *code,
            Self::Extraction { code, .. } => *code,
            Self::Queue { code, .. } => *code,
            Self::Network { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            _ => ErrorCode::Internal,
        }
    }

    /// Invalid or missing provider credentials. Never retried.
    pub fn is_credential_error(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Provider throttling. Retried with the longer rate-limit backoff.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }

    /// Errors confined to a single scene or character.
    ///
    /// These mark the item failed and let the batch continue.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Serialization(_) | Self::Validation { .. }
        ) || matches!(
            self,
            Self::Llm { code, .. } if *code != ErrorCode::LlmUnhealthy
        )
    }

    /// Errors that no amount of retrying can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::InvalidState { .. }
                | Self::Configuration(_)
                | Self::UnsupportedProvider { .. }
                | Self::Extraction { .. }
        )
    }

    /// Whether the job queue should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        !self.is_credential_error() && !self.is_fatal()
    }

    /// Seconds the provider asked us to wait, if any.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Authentication {
                code: ErrorCode::AuthQuotaExhausted,
                ..
            } => Some("Please check the billing status of this provider account"),
            Self::Authentication { .. } => {
                Some("Please check the API key stored for this provider")
            }
            Self::RateLimit { .. } => Some("The provider is throttling requests; the job will retry"),
            Self::NotFound { .. } => Some("Please check the id and ensure it exists"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::Llm { .. } => Some("Please check your LLM provider configuration"),
            Self::Embedding { .. } => Some("Please check your embedding provider configuration"),
            Self::Extraction { .. } => Some("Please check that the uploaded file is a valid e-book"),
            _ => None,
        }
    }

    /// Message suitable for `Document.error_message`.
    pub fn user_message(&self) -> String {
        match self.suggestion() {
            Some(hint) => format!("{} ({})", self, hint),
            None => self.to_string(),
        }
    }

    /// Convert from HTTP status code (for provider responses).
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            400 => Self::Llm {
                message: body.to_string(),
                code: ErrorCode::LlmInvalidResponse,
                source: None,
            },
            401 | 403 => Self::Authentication {
                message: body.to_string(),
                code: ErrorCode::AuthInvalidKey,
                source: None,
            },
            404 => Self::Configuration(format!("Provider endpoint or model not found: {}", body)),
            408 | 504 => Self::Network {
                message: body.to_string(),
                code: ErrorCode::NetTimeout,
                source: None,
            },
            429 => Self::RateLimit {
                message: body.to_string(),
                code: ErrorCode::RateLimitExceeded,
                retry_after: None,
            },
            _ => Self::Network {
                message: format!("HTTP {}: {}", status, body),
                code: ErrorCode::NetConnectionFailed,
                source: None,
            },
        }
    }
}

impl From<rusqlite::Error> for FolioError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}

impl From<folio_extractors::ExtractError> for FolioError {
    fn from(err: folio_extractors::ExtractError) -> Self {
        match err {
            folio_extractors::ExtractError::UnsupportedFormat(format) => Self::Extraction {
                message: format!("Unsupported source format: {}", format),
                code: ErrorCode::ExtUnsupportedFormat,
            },
            folio_extractors::ExtractError::Io(e) => Self::Io(e),
            other => Self::Extraction {
                message: other.to_string(),
                code: ErrorCode::ExtFailed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = FolioError::validation("Invalid input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn test_not_found_error() {
        let err = FolioError::document_not_found("doc-1");
        assert_eq!(err.code(), ErrorCode::DocumentNotFound);
        assert!(err.suggestion().is_some());
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::AuthInvalidKey.as_str(), "AUTH_001");
        assert_eq!(ErrorCode::RateLimitExceeded.as_str(), "RATE_001");
    }

    #[test]
    fn test_http_status_classification() {
        assert!(FolioError::from_http_status(401, "bad key").is_credential_error());
        assert!(FolioError::from_http_status(429, "slow down").is_rate_limit());
        assert!(FolioError::from_http_status(503, "overloaded").is_retryable());
    }

    #[test]
    fn test_item_level_errors() {
        assert!(FolioError::parse("not json").is_item_level());
        assert!(FolioError::llm("empty completion").is_item_level());
        assert!(!FolioError::llm_unhealthy("unreachable").is_item_level());
        assert!(!FolioError::rate_limit("429").is_item_level());
        assert!(!FolioError::authentication("401").is_item_level());
    }

    #[test]
    fn test_credential_errors_not_retried() {
        let err = FolioError::missing_credentials("openai");
        assert_eq!(err.code(), ErrorCode::AuthMissingCredentials);
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("API key"));
    }

    #[test]
    fn test_quota_exhausted_is_credential_class() {
        let err = FolioError::quota_exhausted("You exceeded your current quota");
        assert_eq!(err.code().as_str(), "AUTH_003");
        assert!(err.is_credential_error());
        assert!(!err.is_retryable());
        assert!(!err.is_item_level());
    }
}
