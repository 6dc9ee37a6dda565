//! Shared HTTP plumbing for the reqwest-based providers.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};
use serde::Deserialize;

use folio_core::error::{ErrorCode, FolioError, FolioResult};

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: String },
    Text(String),
}

pub(crate) fn build_client(timeout_secs: u64, headers: HeaderMap) -> FolioResult<Client> {
    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FolioError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Map a transport failure. Timeouts and refused connections are retryable.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> FolioError {
    let code = if err.is_timeout() {
        ErrorCode::NetTimeout
    } else {
        ErrorCode::NetConnectionFailed
    };
    FolioError::Network {
        message: format!("{} request failed: {}", provider, err),
        code,
        source: Some(Box::new(err)),
    }
}

/// Turn a non-success response into a classified error.
pub(crate) async fn error_from_response(provider: &str, response: Response) -> FolioError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    let message = format!("{} API error ({}): {}", provider, status, error_message(&body));
    match FolioError::from_http_status(status, &message) {
        FolioError::RateLimit { message, code, .. } => FolioError::RateLimit {
            message,
            code,
            retry_after,
        },
        other => other,
    }
}

/// Pull the human-readable message out of a provider error body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorDetail::Object { message },
        })
        | Ok(ErrorEnvelope {
            error: ErrorDetail::Text(message),
        }) => message,
        Err(_) => body.trim().to_string(),
    }
}
