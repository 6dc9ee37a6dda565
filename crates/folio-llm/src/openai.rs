//! OpenAI LLM provider implementation.

use async_trait::async_trait;
use tracing::{debug, instrument};

use folio_core::error::{ErrorCode, FolioError, FolioResult};
use folio_core::traits::{GenerationOptions, Llm, LlmConfig, JSON_SYSTEM_INSTRUCTION};

#[cfg(feature = "openai")]
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, ResponseFormat,
    },
    Client,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI LLM provider.
pub struct OpenAIProvider {
    #[cfg(feature = "openai")]
    client: Client<OpenAIConfig>,
    config: LlmConfig,
}

impl OpenAIProvider {
    /// Create a new OpenAI LLM provider. The key comes from `config.api_key`.
    pub fn new(config: LlmConfig) -> FolioResult<Self> {
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

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            #[cfg(feature = "openai")]
            client,
            config,
        })
    }

    /// Reasoning models reject sampling parameters.
    fn is_reasoning_model(&self) -> bool {
        let model = self.config.model.to_lowercase();
        ["o1", "o3", "o4", "gpt-5"].iter().any(|m| model.starts_with(m))
    }

    #[cfg(feature = "openai")]
    fn request(&self, prompt: &str, options: &GenerationOptions) -> CreateChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if options.wants_json() {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(
                        JSON_SYSTEM_INSTRUCTION.to_string(),
                    ),
                    name: None,
                },
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            },
        ));

        let mut request = CreateChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            ..Default::default()
        };
        if options.wants_json() {
            request.response_format = Some(ResponseFormat::JsonObject);
        }
        if !self.is_reasoning_model() {
            request.temperature = Some(options.temperature.unwrap_or(self.config.temperature));
            request.max_tokens = Some(options.max_tokens.unwrap_or(self.config.max_tokens));
        }
        request
    }
}

/// Classify an OpenAI client error.
#[cfg(feature = "openai")]
fn map_openai_error(err: OpenAIError) -> FolioError {
    match err {
        OpenAIError::ApiError(api) => {
            let kind = api.code.clone().or_else(|| api.r#type.clone()).unwrap_or_default();
            match kind.as_str() {
                "invalid_api_key" | "invalid_authentication" => {
                    FolioError::authentication(api.message)
                }
                "rate_limit_exceeded" => FolioError::rate_limit(api.message),
                "insufficient_quota" => FolioError::quota_exhausted(api.message),
                "model_not_found" => FolioError::Configuration(api.message),
                "server_error" => FolioError::api(api.message),
                _ => FolioError::llm(format!("OpenAI API error: {}", api.message)),
            }
        }
        OpenAIError::Reqwest(e) => FolioError::Network {
            message: format!("OpenAI request failed: {}", e),
            code: if e.is_timeout() {
                ErrorCode::NetTimeout
            } else {
                ErrorCode::NetConnectionFailed
            },
            source: Some(Box::new(e)),
        },
        OpenAIError::JSONDeserialize(e) => {
            FolioError::llm(format!("Failed to parse OpenAI response: {}", e))
        }
        other => FolioError::llm(format!("OpenAI error: {}", other)),
    }
}

#[async_trait]
impl Llm for OpenAIProvider {
    #[cfg(feature = "openai")]
    #[instrument(skip(self, prompt, options), fields(model = %self.config.model))]
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> FolioResult<String> {
        let response = self
            .client
            .chat()
            .create(self.request(prompt, options))
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI usage"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| FolioError::llm("No response choices returned"))
    }

    #[cfg(not(feature = "openai"))]
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> FolioResult<String> {
        Err(FolioError::Configuration(
            "OpenAI feature not enabled. Enable the 'openai' feature.".to_string(),
        ))
    }

    #[cfg(feature = "openai")]
    async fn check_health(&self) -> FolioResult<bool> {
        match self.client.models().list().await.map_err(map_openai_error) {
            Ok(_) => Ok(true),
            Err(e) if e.is_credential_error() => Err(e),
            Err(e) => {
                debug!(error = %e, "OpenAI health check failed");
                Ok(false)
            }
        }
    }

    #[cfg(not(feature = "openai"))]
    async fn check_health(&self) -> FolioResult<bool> {
        Ok(false)
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
