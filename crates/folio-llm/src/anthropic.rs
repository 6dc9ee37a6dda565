//! Anthropic (Claude) LLM provider implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use folio_core::error::{FolioError, FolioResult};
use folio_core::traits::{GenerationOptions, Llm, LlmConfig, JSON_SYSTEM_INSTRUCTION};

use crate::http::{build_client, error_from_response, transport_error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";

/// Anthropic LLM provider.
pub struct AnthropicLlm {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

impl AnthropicLlm {
    /// Create a new Anthropic LLM provider. The key comes from `config.api_key`.
    pub fn new(config: LlmConfig) -> FolioResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| FolioError::missing_credentials("anthropic"))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|_| FolioError::authentication("Invalid API key format"))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = build_client(config.timeout_secs, headers)?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| ANTHROPIC_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, options: &GenerationOptions) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.config.model,
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: options.temperature.unwrap_or(self.config.temperature),
            // no native JSON mode; steer with the system prompt instead
            system: options.wants_json().then_some(JSON_SYSTEM_INSTRUCTION),
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

fn response_text(response: AnthropicResponse) -> FolioResult<String> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        warn!("Anthropic response truncated at max_tokens");
    }
    response
        .content
        .into_iter()
        .find(|c| c.content_type == "text")
        .and_then(|c| c.text)
        .ok_or_else(|| FolioError::llm("Anthropic returned no text content"))
}

#[async_trait]
impl Llm for AnthropicLlm {
    #[instrument(skip(self, prompt, options), fields(model = %self.config.model))]
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> FolioResult<String> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&self.request(prompt, options))
            .send()
            .await
            .map_err(|e| transport_error("Anthropic", e))?;

        if !response.status().is_success() {
            return Err(error_from_response("Anthropic", response).await);
        }

        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| FolioError::llm(format!("Failed to parse Anthropic response: {}", e)))?;
        response_text(body)
    }

    async fn check_health(&self) -> FolioResult<bool> {
        let response = match self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Anthropic unreachable");
                return Ok(false);
            }
        };

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(error_from_response("Anthropic", response).await)
            }
            s => {
                debug!(status = %s, "Anthropic health check failed");
                Ok(false)
            }
        }
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn supports_json_mode(&self) -> bool {
        false
    }
}
