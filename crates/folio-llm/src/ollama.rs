//! Ollama LLM provider implementation.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use url::Url;

use folio_core::error::{FolioError, FolioResult};
use folio_core::prompts;
use folio_core::traits::{GenerationOptions, Llm, LlmConfig, JSON_SYSTEM_INSTRUCTION};

#[cfg(feature = "ollama")]
use ollama_rs::{
    generation::completion::request::GenerationRequest,
    generation::options::GenerationOptions as OllamaOptions,
    generation::parameters::FormatType, Ollama,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Ollama LLM provider. Runs against a local server and needs no credential.
pub struct OllamaLlm {
    #[cfg(feature = "ollama")]
    client: Ollama,
    config: LlmConfig,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider.
    pub fn new(config: LlmConfig) -> FolioResult<Self> {
        let (host, port) = host_and_port(config.base_url.as_deref())?;

        #[cfg(feature = "ollama")]
        let client = Ollama::new(host, port);
        #[cfg(not(feature = "ollama"))]
        let _ = (host, port);

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            #[cfg(feature = "ollama")]
            client,
            config,
        })
    }

    #[cfg(feature = "ollama")]
    fn request(&self, prompt: &str, options: &GenerationOptions) -> GenerationRequest {
        let tuning = OllamaOptions::default()
            .temperature(options.temperature.unwrap_or(self.config.temperature))
            .num_predict(options.max_tokens.unwrap_or(self.config.max_tokens) as i32);

        let request = GenerationRequest::new(self.config.model.clone(), prompt.to_string())
            .options(tuning);
        if options.wants_json() {
            request
                .system(JSON_SYSTEM_INSTRUCTION.to_string())
                .format(FormatType::Json)
        } else {
            request
        }
    }

    /// Tag names match with or without the implicit `:latest`.
    fn has_model<'a>(&self, mut names: impl Iterator<Item = &'a str>) -> bool {
        let wanted = self.config.model.as_str();
        names.any(|name| name == wanted || name.strip_suffix(":latest") == Some(wanted))
    }
}

/// Split a base URL into the `(scheme://host, port)` pair the client takes.
pub(crate) fn host_and_port(base_url: Option<&str>) -> FolioResult<(String, u16)> {
    let url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))
        .map_err(|e| FolioError::Configuration(format!("Invalid Ollama URL: {}", e)))?;
    let host = url.host_str().unwrap_or("localhost");
    Ok((
        format!("{}://{}", url.scheme(), host),
        url.port().unwrap_or(11434),
    ))
}

#[async_trait]
impl Llm for OllamaLlm {
    #[cfg(feature = "ollama")]
    #[instrument(skip(self, prompt, options), fields(model = %self.config.model))]
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> FolioResult<String> {
        let response = self
            .client
            .generate(self.request(prompt, options))
            .await
            .map_err(|e| FolioError::api(format!("Ollama API error: {}", e)))?;
        Ok(response.response)
    }

    #[cfg(not(feature = "ollama"))]
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> FolioResult<String> {
        Err(FolioError::Configuration(
            "Ollama feature not enabled. Enable the 'ollama' feature.".to_string(),
        ))
    }

    /// Small local models follow the terse prompt more reliably.
    fn scene_analysis_prompt(&self, scene_text: &str, chapter_title: Option<&str>) -> String {
        prompts::compact_scene_analysis_prompt(scene_text, chapter_title)
    }

    #[cfg(feature = "ollama")]
    async fn check_health(&self) -> FolioResult<bool> {
        let models = match self.client.list_local_models().await {
            Ok(models) => models,
            Err(e) => {
                debug!(error = %e, "Ollama unreachable");
                return Ok(false);
            }
        };
        if !self.has_model(models.iter().map(|m| m.name.as_str())) {
            warn!(model = %self.config.model, "Ollama is up but the model is not pulled");
            return Ok(false);
        }
        Ok(true)
    }

    #[cfg(not(feature = "ollama"))]
    async fn check_health(&self) -> FolioResult<bool> {
        Ok(false)
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
