//! Pipeline events.
//!
//! Emitted as documents move through the stages so callers can render
//! progress without polling the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DocumentStatus, Stage};

/// Events published on the [`EventBus`](super::EventBus).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Progress moved within a stage.
    Progress(ProgressEvent),
    /// The document changed state.
    StatusChanged(StatusChangedEvent),
    /// A stage attempt failed.
    Error(StageErrorEvent),
    /// A stage finished.
    Completed(StageCompletedEvent),
}

impl PipelineEvent {
    /// Event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Progress(_) => "document.progress",
            Self::StatusChanged(_) => "document.status_changed",
            Self::Error(_) => "document.error",
            Self::Completed(_) => "document.stage_completed",
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            Self::Progress(e) => &e.document_id,
            Self::StatusChanged(e) => &e.document_id,
            Self::Error(e) => &e.document_id,
            Self::Completed(e) => &e.document_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Progress(e) => e.timestamp,
            Self::StatusChanged(e) => e.timestamp,
            Self::Error(e) => e.timestamp,
            Self::Completed(e) => e.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub document_id: String,
    pub stage: Stage,
    /// Overall progress, 0 to 100.
    pub percent: u8,
    pub step: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub document_id: String,
    pub from: DocumentStatus,
    pub to: DocumentStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageErrorEvent {
    pub document_id: String,
    pub stage: Stage,
    pub message: String,
    /// Whether the job will be attempted again.
    pub will_retry: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCompletedEvent {
    pub document_id: String,
    pub stage: Stage,
    /// Items the stage produced or processed (scenes, analyses, characters).
    pub items: usize,
    /// Items that failed without failing the stage.
    pub item_errors: usize,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn progress(
        document_id: impl Into<String>,
        stage: Stage,
        percent: u8,
        step: impl Into<String>,
    ) -> Self {
        Self::Progress(ProgressEvent {
            document_id: document_id.into(),
            stage,
            percent,
            step: step.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn status_changed(
        document_id: impl Into<String>,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Self {
        Self::StatusChanged(StatusChangedEvent {
            document_id: document_id.into(),
            from,
            to,
            timestamp: Utc::now(),
        })
    }

    pub fn error(
        document_id: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
        will_retry: bool,
    ) -> Self {
        Self::Error(StageErrorEvent {
            document_id: document_id.into(),
            stage,
            message: message.into(),
            will_retry,
            timestamp: Utc::now(),
        })
    }

    pub fn completed(
        document_id: impl Into<String>,
        stage: Stage,
        items: usize,
        item_errors: usize,
    ) -> Self {
        Self::Completed(StageCompletedEvent {
            document_id: document_id.into(),
            stage,
            items,
            item_errors,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PipelineEvent::status_changed(
            "doc-1",
            DocumentStatus::Analyzing,
            DocumentStatus::Analyzed,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "analyzed");
        assert_eq!(event.event_type(), "document.status_changed");
        assert_eq!(event.document_id(), "doc-1");
    }
}
