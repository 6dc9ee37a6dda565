//! Scene types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::SceneAnalysis;

/// Scene-type tag assigned by the segmenter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SceneType {
    #[default]
    Narrative,
    Dialogue,
    Action,
    Description,
    Transition,
}

/// LLM analysis status of a scene.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    /// Status only moves forward. A failed scene may start a new attempt,
    /// and a scene left `processing` by an interrupted job may be claimed again.
    pub fn can_advance_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
        )
    }

    /// Whether the analysis stage still has work to do for this scene.
    pub fn needs_analysis(&self) -> bool {
        !matches!(self, AnalysisStatus::Completed)
    }
}

/// A contiguous span of narrative or dialogue text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub document_id: String,
    /// Position across the whole document, from 0. Sort key everywhere.
    pub global_index: u32,
    pub chapter_index: u32,
    pub chapter_title: String,
    /// Position within the chapter, from 0.
    pub scene_index: u32,
    pub text: String,
    pub word_count: u32,
    pub scene_type: SceneType,
    pub has_dialogue: bool,
    pub estimated_characters: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub analysis_status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<SceneAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A scene produced by the segmenter, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScene {
    pub global_index: u32,
    pub chapter_index: u32,
    pub chapter_title: String,
    pub scene_index: u32,
    pub text: String,
    pub word_count: u32,
    pub scene_type: SceneType,
    pub has_dialogue: bool,
    pub estimated_characters: u8,
    pub speaker: Option<String>,
}

/// Outcome of one analysis attempt, written back to the scene row.
#[derive(Debug, Clone)]
pub enum SceneAnalysisUpdate {
    Started,
    Completed(SceneAnalysis),
    Failed(String),
}

impl SceneAnalysisUpdate {
    pub fn status(&self) -> AnalysisStatus {
        match self {
            Self::Started => AnalysisStatus::Processing,
            Self::Completed(_) => AnalysisStatus::Completed,
            Self::Failed(_) => AnalysisStatus::Failed,
        }
    }
}

/// Per-status scene counts for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCounts {
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

impl AnalysisCounts {
    pub fn total(&self) -> u32 {
        self.pending + self.processing + self.completed + self.failed
    }

    /// Scenes that still need an analysis run.
    pub fn outstanding(&self) -> u32 {
        self.pending + self.processing + self.failed
    }
}
