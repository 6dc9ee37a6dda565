//! Pipeline stages and durable job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::DocumentStatus;

/// One phase of the pipeline, backed by its own job queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Segmentation,
    Analysis,
    Discovery,
}

impl Stage {
    /// Statuses from which the stage may start.
    pub fn accepts(&self, status: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match self {
            Stage::Segmentation => matches!(status, Uploading | Parsing),
            Stage::Analysis => matches!(status, ScenesDetected | Analyzing | Analyzed),
            Stage::Discovery => matches!(
                status,
                Analyzed | DiscoveringCharacters | BuildingCharacterProfiles | CharactersDiscovered
            ),
        }
    }

    /// Stable status the stage is normally enqueued from.
    pub fn entry_status(&self) -> DocumentStatus {
        match self {
            Stage::Segmentation => DocumentStatus::Uploading,
            Stage::Analysis => DocumentStatus::ScenesDetected,
            Stage::Discovery => DocumentStatus::Analyzed,
        }
    }

    /// Status while the stage is running.
    pub fn running_status(&self) -> DocumentStatus {
        match self {
            Stage::Segmentation => DocumentStatus::Parsing,
            Stage::Analysis => DocumentStatus::Analyzing,
            Stage::Discovery => DocumentStatus::DiscoveringCharacters,
        }
    }

    /// Status after the stage succeeds.
    pub fn success_status(&self) -> DocumentStatus {
        match self {
            Stage::Segmentation => DocumentStatus::ScenesDetected,
            Stage::Analysis => DocumentStatus::Analyzed,
            Stage::Discovery => DocumentStatus::CharactersDiscovered,
        }
    }

    /// Last stable status to fall back to when the stage gives up.
    ///
    /// Segmentation has nothing salvageable and fails the document.
    pub fn rollback_status(&self) -> DocumentStatus {
        match self {
            Stage::Segmentation => DocumentStatus::Failed,
            Stage::Analysis => DocumentStatus::ScenesDetected,
            Stage::Discovery => DocumentStatus::Analyzed,
        }
    }

    /// Overall progress band `(start, end)` in percent.
    pub fn progress_band(&self) -> (u8, u8) {
        match self {
            Stage::Segmentation => (0, 20),
            Stage::Analysis => (20, 70),
            Stage::Discovery => (70, 100),
        }
    }

    /// Map a fraction of this stage's work onto overall progress.
    pub fn overall_progress(&self, fraction: f32) -> u8 {
        let (start, end) = self.progress_band();
        let fraction = fraction.clamp(0.0, 1.0);
        start + ((end - start) as f32 * fraction).round() as u8
    }

    /// Stage that resumes work for a document left in `status`.
    pub fn for_status(status: DocumentStatus) -> Option<Stage> {
        use DocumentStatus::*;
        match status {
            Uploading | Parsing => Some(Stage::Segmentation),
            ScenesDetected | Analyzing => Some(Stage::Analysis),
            Analyzed | DiscoveringCharacters | BuildingCharacterProfiles => Some(Stage::Discovery),
            CharactersDiscovered | Generating | Completed | Failed => None,
        }
    }

    /// Deterministic job identity: one in-flight job per document per stage.
    pub fn job_key(&self, document_id: &str) -> String {
        format!("{}:{}", self, document_id)
    }
}

/// Minimal payload carried by every stage job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    pub document_id: String,
    pub caller_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Cap on items processed in this run (analysis only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl StagePayload {
    pub fn new(document_id: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            caller_id: caller_id.into(),
            provider: None,
            model: None,
            limit: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Lifecycle of a durable job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

/// A persisted stage job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub stage: Stage,
    pub job_key: String,
    pub payload: StagePayload,
    pub status: JobStatus,
    /// Attempts started so far, including the current one.
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_after: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Result of an enqueue call.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// A new job was created.
    Enqueued(JobRecord),
    /// A job with the same key is already queued or running; nothing changed.
    AlreadyActive(JobRecord),
}

impl EnqueueOutcome {
    pub fn job(&self) -> &JobRecord {
        match self {
            EnqueueOutcome::Enqueued(job) | EnqueueOutcome::AlreadyActive(job) => job,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, EnqueueOutcome::Enqueued(_))
    }
}
