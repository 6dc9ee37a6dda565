//! Shared fixtures: scripted providers and an in-memory orchestrator.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use folio_core::config::{AnalysisConfig, ExtractionConfig, QueueConfig, QueuePolicy};
use folio_core::traits::{GenerationOptions, ProviderFactory, ProviderRequest};
use folio_core::{Embedder, FolioConfig, FolioError, FolioResult, Llm, LocalFsStore, Orchestrator, SqliteStore};

/// Marker that makes the scripted LLM return truncated JSON for a scene.
pub const MALFORMED: &str = "Garbled";

/// LLM stub that answers each prompt family with canned JSON.
///
/// Scene analyses list every roster name found in the scene text, longest
/// first. Comparisons answer "same" with `confidence` when the two names
/// share a word and "different" otherwise.
pub struct ScriptedLlm {
    roster: Vec<String>,
    confidence: Mutex<f32>,
    pub healthy: AtomicBool,
    /// Scenes containing [`MALFORMED`] get unparseable output while set.
    pub garble: AtomicBool,
    /// Every scene call fails with a network error while set.
    pub outage: AtomicBool,
    pub analyzed: Mutex<Vec<String>>,
    pub comparisons: AtomicUsize,
    pub syntheses: AtomicUsize,
    /// Characters whose profile comes back without summaries.
    pub thin_profiles: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(roster: &[&str]) -> Self {
        let mut roster: Vec<String> = roster.iter().map(|s| s.to_string()).collect();
        roster.sort_by_key(|name| std::cmp::Reverse(name.len()));
        Self {
            roster,
            confidence: Mutex::new(0.9),
            healthy: AtomicBool::new(true),
            garble: AtomicBool::new(true),
            outage: AtomicBool::new(false),
            analyzed: Mutex::new(Vec::new()),
            comparisons: AtomicUsize::new(0),
            syntheses: AtomicUsize::new(0),
            thin_profiles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_confidence(self, confidence: f32) -> Self {
        *self.confidence.lock().unwrap() = confidence;
        self
    }

    pub fn scene_calls(&self) -> usize {
        self.analyzed.lock().unwrap().len()
    }

    fn analyze(&self, prompt: &str) -> FolioResult<String> {
        let scene = between(prompt, "\"\"\"\n", "\n\"\"\"").unwrap_or_default();
        self.analyzed.lock().unwrap().push(scene.to_string());

        if self.outage.load(Ordering::SeqCst) {
            return Err(FolioError::api("connection reset by peer"));
        }
        if self.garble.load(Ordering::SeqCst) && scene.contains(MALFORMED) {
            return Ok(r#"{"characters": ["#.to_string());
        }

        let mut remaining = scene.to_string();
        let mut characters = Vec::new();
        for name in &self.roster {
            if remaining.contains(name.as_str()) {
                remaining = remaining.replace(name.as_str(), "");
                characters.push(serde_json::json!({
                    "name": name,
                    "description": format!("{} wears a dark wool cloak", name),
                }));
            }
        }
        let setting = if scene.contains("hall") { "Great Hall" } else { "Godswood" };

        Ok(serde_json::json!({
            "characters": characters,
            "setting": setting,
            "timeOfDay": "night",
            "mood": "tense",
            "visualElements": ["torches", "snow"],
            "keyActions": ["waiting"]
        })
        .to_string())
    }

    fn compare(&self, prompt: &str) -> String {
        self.comparisons.fetch_add(1, Ordering::SeqCst);
        let a = between(prompt, "Character A: \"", "\"").unwrap_or_default().to_lowercase();
        let b = between(prompt, "Character B: \"", "\"").unwrap_or_default().to_lowercase();
        let shared = a.split_whitespace().any(|t| b.split_whitespace().any(|u| u == t));

        let confidence = *self.confidence.lock().unwrap();
        if shared {
            serde_json::json!({"same": true, "confidence": confidence, "reasoning": "same name"})
        } else {
            serde_json::json!({"same": false, "confidence": 0.1, "reasoning": "different people"})
        }
        .to_string()
    }

    fn synthesize(&self, prompt: &str) -> String {
        self.syntheses.fetch_add(1, Ordering::SeqCst);
        let name = between(prompt, "Name: ", "\n").unwrap_or("someone");
        if self.thin_profiles.lock().unwrap().iter().any(|n| n == name) {
            return serde_json::json!({"hair": {"color": "brown"}}).to_string();
        }
        serde_json::json!({
            "hair": {"color": "black", "length": "shoulder-length"},
            "face": {"eye_color": "grey"},
            "clothing": {"typical_attire": "dark wool cloak"},
            "distinctive_features": ["long face"],
            "visual_summary": format!("{} is lean with a long face and dark hair.", name),
            "personality_summary": format!("{} is brooding and loyal.", name),
        })
        .to_string()
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn generate(&self, prompt: &str, _options: &GenerationOptions) -> FolioResult<String> {
        if prompt.starts_with("You are analysing a scene") {
            self.analyze(prompt)
        } else if prompt.starts_with("Two names were extracted") {
            Ok(self.compare(prompt))
        } else if prompt.starts_with("Build a consistent visual profile") {
            Ok(self.synthesize(prompt))
        } else {
            Err(FolioError::llm("unexpected prompt"))
        }
    }

    async fn check_health(&self) -> FolioResult<bool> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-1"
    }
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

/// Bag-of-words embedder: each word hashed into one of 16 buckets.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    /// Upcoming calls answered with a rate-limit error.
    pub throttled: AtomicUsize,
    /// Return vectors one dimension short while set.
    pub truncate: AtomicBool,
}

impl HashEmbedder {
    pub const DIMS: usize = 16;

    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            throttled: AtomicUsize::new(0),
            truncate: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> FolioResult<Vec<f32>> {
        if self
            .throttled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(FolioError::rate_limit("too many embedding requests"));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; Self::DIMS];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                % Self::DIMS;
            vector[bucket] += 1.0;
        }
        if self.truncate.load(Ordering::SeqCst) {
            vector.pop();
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        Self::DIMS
    }

    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_name(&self) -> &str {
        "hash-16"
    }

    fn batch_delay(&self) -> std::time::Duration {
        std::time::Duration::ZERO
    }
}

/// Hands out the same stubs to every caller.
pub struct StubProviders {
    pub llm: Arc<ScriptedLlm>,
    pub embedder: Arc<HashEmbedder>,
    /// Simulate a caller with no stored key.
    pub reject_credentials: AtomicBool,
    /// Same, for the embedding provider only.
    pub reject_embedder: AtomicBool,
    pub requests: Mutex<Vec<ProviderRequest>>,
}

#[async_trait]
impl ProviderFactory for StubProviders {
    async fn llm(&self, request: &ProviderRequest) -> FolioResult<Arc<dyn Llm>> {
        self.requests.lock().unwrap().push(request.clone());
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(FolioError::missing_credentials("openai"));
        }
        Ok(self.llm.clone())
    }

    async fn embedder(&self, _request: &ProviderRequest) -> FolioResult<Arc<dyn Embedder>> {
        if self.reject_embedder.load(Ordering::SeqCst) {
            return Err(FolioError::missing_credentials("openai"));
        }
        Ok(self.embedder.clone())
    }
}

/// Configuration tuned for tests: small chapters, no delays, no backoff.
pub fn test_config(dir: &TempDir) -> FolioConfig {
    let instant = QueuePolicy {
        concurrency: 1,
        max_attempts: 3,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        multiplier: 2.0,
    };

    FolioConfig::builder()
        .database_path(":memory:")
        .storage_root(dir.path().join("objects"))
        .extraction(ExtractionConfig {
            min_chapter_words: 20,
        })
        .analysis(AnalysisConfig {
            inter_call_delay_ms: 0,
            auto_analyze: true,
            auto_discover: true,
            ..Default::default()
        })
        .queues(QueueConfig {
            segmentation: instant.clone(),
            analysis: instant.clone(),
            discovery: instant,
            rate_limit_backoff_factor: 1.0,
            poll_interval_ms: 10,
        })
        .build()
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<SqliteStore>,
    pub objects: Arc<LocalFsStore>,
    pub providers: Arc<StubProviders>,
    _dir: TempDir,
}

impl Harness {
    pub fn llm(&self) -> &ScriptedLlm {
        &self.providers.llm
    }
}

pub fn harness(llm: ScriptedLlm) -> Harness {
    harness_with(llm, |_| {})
}

pub fn harness_with(llm: ScriptedLlm, tweak: impl FnOnce(&mut FolioConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    tweak(&mut config);

    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let objects = Arc::new(LocalFsStore::new(config.storage_root.clone()));
    let providers = Arc::new(StubProviders {
        llm: Arc::new(llm),
        embedder: Arc::new(HashEmbedder::new()),
        reject_credentials: AtomicBool::new(false),
        reject_embedder: AtomicBool::new(false),
        requests: Mutex::new(Vec::new()),
    });

    let orchestrator = Arc::new(Orchestrator::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        objects.clone(),
        providers.clone(),
    ));

    Harness {
        orchestrator,
        store,
        objects,
        providers,
        _dir: dir,
    }
}

pub fn roster() -> ScriptedLlm {
    ScriptedLlm::new(&["Jon Snow", "Jon", "Arya", "Maester Luwin"])
}

/// A paragraph long enough to pass the chapter filter on its own.
pub fn paragraph(lead: &str) -> String {
    format!(
        "{} crossed the frozen yard while the bells of the old tower rang out over the walls and the wind carried snow against the shuttered windows of the keep.",
        lead
    )
}

/// Three chapters; the last is too short to count as story text.
pub fn three_chapter_book() -> String {
    format!(
        "Chapter 1\n\n{}\n\n{}\n\nChapter 2\n\n{}\n\n{}\n\n{}\n\nChapter 3\n\nThe end.\n",
        paragraph("Jon Snow"),
        paragraph("Arya"),
        paragraph("Jon"),
        paragraph("Maester Luwin"),
        paragraph("Jon Snow and Arya"),
    )
}

/// One chapter of five scenes; the third is garbled by the scripted LLM.
pub fn five_scene_book() -> String {
    format!(
        "Chapter 1\n\n{}\n\n{}\n\n{}\n\n{}\n\n{}\n",
        paragraph("Jon Snow"),
        paragraph("Arya"),
        paragraph(&format!("{} Jon", MALFORMED)),
        paragraph("Maester Luwin"),
        paragraph("Jon Snow in the hall"),
    )
}
