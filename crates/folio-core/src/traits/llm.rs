//! LLM trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::FolioResult;
use crate::prompts;
use crate::types::SceneAnalysis;

/// Output format requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Plain text response.
    #[default]
    Text,
    /// A single JSON object and nothing else.
    Json,
}

/// Configuration options for one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Response format.
    pub format: ResponseFormat,
}

impl GenerationOptions {
    /// Options for a JSON-mode call.
    pub fn json() -> Self {
        Self {
            format: ResponseFormat::Json,
            ..Default::default()
        }
    }

    /// Options for a plain-text call.
    pub fn text() -> Self {
        Self::default()
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Whether JSON mode was requested.
    pub fn wants_json(&self) -> bool {
        self.format == ResponseFormat::Json
    }
}

/// System instruction used by providers that accept one in JSON mode.
pub const JSON_SYSTEM_INSTRUCTION: &str =
    "You are a precise literary analysis assistant. Respond with a single valid JSON object only. Do not include explanations, markdown or code fences.";

/// Core LLM trait - every LLM vendor implements this.
///
/// `analyze_scene` has a default implementation built on `generate`; vendors
/// tune it by overriding `scene_analysis_prompt`.
#[async_trait]
pub trait Llm: Send + Sync {
    /// Generate raw text for a prompt.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> FolioResult<String>;

    /// Analyze one scene into the structured analysis record.
    ///
    /// Malformed JSON surfaces as a parse error for this scene only; missing
    /// or mistyped fields are normalized to defaults.
    async fn analyze_scene(
        &self,
        scene_text: &str,
        chapter_title: Option<&str>,
    ) -> FolioResult<SceneAnalysis> {
        let prompt = self.scene_analysis_prompt(scene_text, chapter_title);
        let options = GenerationOptions::json()
            .with_temperature(0.3)
            .with_max_tokens(1500);
        let raw = self.generate(&prompt, &options).await?;
        SceneAnalysis::from_llm_response(&raw)
    }

    /// Build the scene-analysis prompt for this provider.
    fn scene_analysis_prompt(&self, scene_text: &str, chapter_title: Option<&str>) -> String {
        prompts::scene_analysis_prompt(scene_text, chapter_title)
    }

    /// Verify reachability and credentials before a batch begins.
    ///
    /// `Ok(false)` means unreachable; rejected credentials are returned as
    /// an authentication error so they are not retried.
    async fn check_health(&self) -> FolioResult<bool>;

    /// Provider tag (e.g. "openai").
    fn provider_name(&self) -> &str;

    /// Get the model name.
    fn model_name(&self) -> &str;

    /// Check if this model supports a native JSON mode.
    fn supports_json_mode(&self) -> bool {
        true
    }
}

/// LLM provider type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum LlmProvider {
    #[default]
    #[strum(to_string = "openai")]
    OpenAI,
    #[strum(to_string = "anthropic", serialize = "claude")]
    Anthropic,
    /// Local models; needs no credential.
    #[strum(to_string = "ollama", serialize = "local")]
    Ollama,
}

impl LlmProvider {
    /// Whether a stored credential is required to use this provider.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, LlmProvider::Ollama)
    }
}

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name/identifier. Empty means the provider default.
    #[serde(default)]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key (if not resolved per caller).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL for API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_provider_parse() {
        assert_eq!(LlmProvider::from_str("OpenAI").unwrap(), LlmProvider::OpenAI);
        assert_eq!(LlmProvider::from_str("local").unwrap(), LlmProvider::Ollama);
        assert_eq!(LlmProvider::from_str("claude").unwrap(), LlmProvider::Anthropic);
        assert!(LlmProvider::from_str("vendor-x").is_err());
        assert_eq!(LlmProvider::Ollama.to_string(), "ollama");
    }

    #[test]
    fn test_credential_requirement() {
        assert!(LlmProvider::OpenAI.requires_credential());
        assert!(!LlmProvider::Ollama.requires_credential());
    }

    #[test]
    fn test_generation_options() {
        let options = GenerationOptions::json().with_temperature(0.1).with_max_tokens(50);
        assert!(options.wants_json());
        assert_eq!(options.max_tokens, Some(50));
        assert!(!GenerationOptions::text().wants_json());
    }
}
