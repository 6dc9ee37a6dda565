//! Document types and the pipeline state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use folio_extractors::SourceFormat;

/// Pipeline status of a document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Uploading,
    Parsing,
    ScenesDetected,
    Analyzing,
    Analyzed,
    DiscoveringCharacters,
    BuildingCharacterProfiles,
    CharactersDiscovered,
    Generating,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Whether a stage is currently working on the document.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Uploading
                | Self::Parsing
                | Self::Analyzing
                | Self::DiscoveringCharacters
                | Self::BuildingCharacterProfiles
                | Self::Generating
        )
    }

    /// Whether no further transitions are possible without a retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Re-entering the current state is allowed so a retried job can mark
    /// its stage as running again.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;

        if *self == next {
            return !matches!(self, Completed);
        }
        if next == Failed {
            return *self != Completed;
        }

        match self {
            Uploading => matches!(next, Parsing),
            Parsing => matches!(next, ScenesDetected),
            ScenesDetected => matches!(next, Analyzing),
            Analyzing => matches!(next, Analyzed | ScenesDetected),
            Analyzed => matches!(next, Analyzing | DiscoveringCharacters),
            // straight to discovered when no character survived extraction
            DiscoveringCharacters => {
                matches!(next, BuildingCharacterProfiles | CharactersDiscovered | Analyzed)
            }
            // a retried discovery run starts over from extraction
            BuildingCharacterProfiles => {
                matches!(next, CharactersDiscovered | Analyzed | DiscoveringCharacters)
            }
            CharactersDiscovered => matches!(next, DiscoveringCharacters | Generating),
            Generating => matches!(next, Completed | CharactersDiscovered),
            Completed => false,
            // retry restores whatever state preceded the failure
            Failed => next != Completed,
        }
    }
}

/// A book-derived unit of work tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Object-storage path of the uploaded source.
    pub source_path: String,
    pub source_format: SourceFormat,
    /// SHA-256 of the uploaded bytes.
    pub content_hash: String,
    pub status: DocumentStatus,
    /// State before the last failure; restored by retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<DocumentStatus>,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub total_chapters: u32,
    pub total_scenes: u32,
    pub total_characters: u32,
    pub total_words: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Set progress and step, clamping the percent to 100.
    pub fn set_progress(&mut self, percent: u8, step: impl Into<String>) {
        self.progress_percent = percent.min(100);
        self.current_step = Some(step.into());
    }
}

/// Fields needed to create a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: String,
    pub title: Option<String>,
    pub source_path: String,
    pub source_format: SourceFormat,
    pub content_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_happy_path_transitions() {
        use DocumentStatus::*;
        let path = [
            Uploading,
            Parsing,
            ScenesDetected,
            Analyzing,
            Analyzed,
            DiscoveringCharacters,
            BuildingCharacterProfiles,
            CharactersDiscovered,
            Generating,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        use DocumentStatus::*;
        assert!(!Uploading.can_transition_to(Analyzed));
        assert!(!ScenesDetected.can_transition_to(CharactersDiscovered));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_failure_and_rollback() {
        use DocumentStatus::*;
        assert!(Analyzing.can_transition_to(Failed));
        assert!(Analyzing.can_transition_to(ScenesDetected));
        assert!(DiscoveringCharacters.can_transition_to(Analyzed));
        assert!(Failed.can_transition_to(Analyzing));
        assert!(Analyzing.can_transition_to(Analyzing));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(
            DocumentStatus::DiscoveringCharacters.to_string(),
            "discovering_characters"
        );
        assert_eq!(
            DocumentStatus::from_str("scenes_detected").unwrap(),
            DocumentStatus::ScenesDetected
        );
    }
}
