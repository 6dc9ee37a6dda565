//! Configuration system for folio.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FolioError, FolioResult};
use crate::traits::{EmbedderConfig, EmbedderProvider, LlmConfig, LlmProvider};

/// Provider configuration with type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Provider type.
    pub provider: LlmProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: LlmConfig,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            config: LlmConfig {
                model: "gpt-4o-mini".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Embedder provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderProviderConfig {
    /// Provider type.
    pub provider: EmbedderProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: EmbedderConfig,
}

impl Default for EmbedderProviderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::OpenAI,
            config: EmbedderConfig::default(),
        }
    }
}

/// Retry and concurrency policy for one stage queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePolicy {
    /// Worker pool size.
    pub concurrency: usize,
    /// Attempts before the job is marked failed.
    pub max_attempts: u32,
    /// First backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential growth factor between attempts.
    pub multiplier: f32,
}

impl QueuePolicy {
    /// Extraction and segmentation: failures are usually transient I/O.
    pub fn segmentation() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }

    /// LLM-backed stages: retries are costly and rate-limit sensitive.
    pub fn llm_stage() -> Self {
        Self {
            concurrency: 1,
            max_attempts: 3,
            initial_backoff_ms: 5_000,
            max_backoff_ms: 300_000,
            multiplier: 3.0,
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Per-stage queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub segmentation: QueuePolicy,
    pub analysis: QueuePolicy,
    pub discovery: QueuePolicy,
    /// Extra multiplier applied to the backoff after a rate-limit error.
    pub rate_limit_backoff_factor: f32,
    /// How often idle workers look for due jobs, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            segmentation: QueuePolicy::segmentation(),
            analysis: QueuePolicy::llm_stage(),
            discovery: QueuePolicy::llm_stage(),
            rate_limit_backoff_factor: 4.0,
            poll_interval_ms: 1_000,
        }
    }
}

/// Text extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Chapters with fewer words are treated as front/back matter.
    pub min_chapter_words: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_chapter_words: folio_extractors::DEFAULT_MIN_CHAPTER_WORDS,
        }
    }
}

/// Scene analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Scenes analyzed concurrently within one job.
    pub concurrency: usize,
    /// Pause between LLM calls, in milliseconds.
    pub inter_call_delay_ms: u64,
    /// Enqueue analysis when segmentation completes.
    pub auto_analyze: bool,
    /// Enqueue character discovery when analysis completes.
    pub auto_discover: bool,
    /// Number of progress updates per analysis run.
    pub progress_milestones: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            inter_call_delay_ms: 500,
            auto_analyze: false,
            auto_discover: true,
            progress_milestones: 10,
        }
    }
}

/// Character deduplication thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Merge only when the LLM verdict confidence exceeds this.
    pub confidence_threshold: f32,
    /// Name pairs below this similarity skip the LLM comparison.
    pub name_similarity_threshold: f32,
    /// Verdicts between this and `confidence_threshold` are logged as ambiguous.
    pub ambiguous_floor: f32,
    /// Representative mentions sent per side of a comparison.
    pub max_mentions_per_side: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            name_similarity_threshold: 0.3,
            ambiguous_floor: 0.5,
            max_mentions_per_side: 5,
        }
    }
}

/// Profile synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Mentions included in the synthesis prompt.
    pub max_mentions: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_mentions: 10,
            temperature: 0.4,
            max_tokens: 2500,
        }
    }
}

/// Appearance-ratio cutoffs for role classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleThresholds {
    pub protagonist: f32,
    pub supporting: f32,
    pub minor: f32,
}

impl Default for RoleThresholds {
    fn default() -> Self {
        Self {
            protagonist: 0.4,
            supporting: 0.2,
            minor: 0.05,
        }
    }
}

/// Similarity query defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub default_threshold: f32,
    pub default_limit: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.5,
            default_limit: 10,
        }
    }
}

/// Main folio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    /// Path to the SQLite database.
    pub database_path: PathBuf,
    /// Root directory for uploaded source files.
    pub storage_root: PathBuf,
    /// Default LLM provider.
    pub llm: LlmProviderConfig,
    /// Default embedder provider.
    pub embedder: EmbedderProviderConfig,
    pub queues: QueueConfig,
    pub extraction: ExtractionConfig,
    pub analysis: AnalysisConfig,
    pub dedup: DedupConfig,
    pub synthesis: SynthesisConfig,
    pub roles: RoleThresholds,
    pub similarity: SimilarityConfig,
}

impl Default for FolioConfig {
    fn default() -> Self {
        let folio_dir = dirs::home_dir()
            .map(|h| h.join(".folio"))
            .unwrap_or_else(|| PathBuf::from(".folio"));

        Self {
            database_path: folio_dir.join("folio.db"),
            storage_root: folio_dir.join("storage"),
            llm: LlmProviderConfig::default(),
            embedder: EmbedderProviderConfig::default(),
            queues: QueueConfig::default(),
            extraction: ExtractionConfig::default(),
            analysis: AnalysisConfig::default(),
            dedup: DedupConfig::default(),
            synthesis: SynthesisConfig::default(),
            roles: RoleThresholds::default(),
            similarity: SimilarityConfig::default(),
        }
    }
}

impl FolioConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> FolioResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| FolioError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| FolioError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| FolioError::Configuration(e.to_string())),
            _ => Err(FolioError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> FolioResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay `FOLIO_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) -> FolioResult<()> {
        if let Ok(path) = std::env::var("FOLIO_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("FOLIO_STORAGE_ROOT") {
            self.storage_root = PathBuf::from(path);
        }

        // LLM configuration
        if let Ok(provider) = std::env::var("FOLIO_LLM_PROVIDER") {
            self.llm.provider = provider
                .parse()
                .map_err(|_| FolioError::UnsupportedProvider { provider })?;
        }
        if let Ok(model) = std::env::var("FOLIO_LLM_MODEL") {
            self.llm.config.model = model;
        }
        if let Ok(url) = std::env::var("FOLIO_LLM_BASE_URL") {
            self.llm.config.base_url = Some(url);
        }

        // Embedder configuration
        if let Ok(provider) = std::env::var("FOLIO_EMBEDDER_PROVIDER") {
            self.embedder.provider = provider
                .parse()
                .map_err(|_| FolioError::UnsupportedProvider { provider })?;
        }
        if let Ok(model) = std::env::var("FOLIO_EMBEDDER_MODEL") {
            self.embedder.config.model = model;
        }
        if let Ok(dims) = std::env::var("FOLIO_EMBEDDER_DIMS") {
            self.embedder.config.embedding_dims = parse_env("FOLIO_EMBEDDER_DIMS", &dims)?;
        }

        // Pipeline tuning
        if let Ok(value) = std::env::var("FOLIO_ANALYSIS_CONCURRENCY") {
            self.analysis.concurrency = parse_env("FOLIO_ANALYSIS_CONCURRENCY", &value)?;
        }
        if let Ok(value) = std::env::var("FOLIO_ANALYSIS_DELAY_MS") {
            self.analysis.inter_call_delay_ms = parse_env("FOLIO_ANALYSIS_DELAY_MS", &value)?;
        }
        if let Ok(value) = std::env::var("FOLIO_AUTO_ANALYZE") {
            self.analysis.auto_analyze = parse_env("FOLIO_AUTO_ANALYZE", &value)?;
        }
        if let Ok(value) = std::env::var("FOLIO_MIN_CHAPTER_WORDS") {
            self.extraction.min_chapter_words = parse_env("FOLIO_MIN_CHAPTER_WORDS", &value)?;
        }

        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> FolioConfigBuilder {
        FolioConfigBuilder::default()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> FolioResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FolioError::Configuration(format!("Invalid value for {}: {}", name, value)))
}

/// Builder for FolioConfig.
#[derive(Default)]
pub struct FolioConfigBuilder {
    config: FolioConfig,
}

impl FolioConfigBuilder {
    /// Set database path.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Set storage root.
    pub fn storage_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_root = path.into();
        self
    }

    /// Set LLM configuration.
    pub fn llm(mut self, config: LlmProviderConfig) -> Self {
        self.config.llm = config;
        self
    }

    /// Set embedder configuration.
    pub fn embedder(mut self, config: EmbedderProviderConfig) -> Self {
        self.config.embedder = config;
        self
    }

    /// Set queue configuration.
    pub fn queues(mut self, config: QueueConfig) -> Self {
        self.config.queues = config;
        self
    }

    pub fn extraction(mut self, config: ExtractionConfig) -> Self {
        self.config.extraction = config;
        self
    }

    pub fn analysis(mut self, config: AnalysisConfig) -> Self {
        self.config.analysis = config;
        self
    }

    pub fn dedup(mut self, config: DedupConfig) -> Self {
        self.config.dedup = config;
        self
    }

    pub fn synthesis(mut self, config: SynthesisConfig) -> Self {
        self.config.synthesis = config;
        self
    }

    pub fn roles(mut self, config: RoleThresholds) -> Self {
        self.config.roles = config;
        self
    }

    pub fn similarity(mut self, config: SimilarityConfig) -> Self {
        self.config.similarity = config;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> FolioConfig {
        self.config
    }
}
