//! Embedding records and similarity results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of entity an embedding belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Character,
    Setting,
}

/// A provider-tagged vector, one per owning entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Id of the owning Character or Setting; the upsert key.
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub document_id: String,
    pub provider: String,
    pub model: String,
    pub vector: Vec<f32>,
    /// SHA-256 of the text the vector was computed from.
    pub text_hash: String,
    pub updated_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    /// Whether two records come from the same (provider, model) pair.
    pub fn same_space(&self, other: &EmbeddingRecord) -> bool {
        self.provider == other.provider && self.model == other.model
    }
}

/// Similarity query parameters.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    /// Restrict candidates to one entity kind.
    pub kind: Option<EntityKind>,
    /// Minimum similarity (0.0 - 1.0).
    pub threshold: f32,
    /// Maximum number of results.
    pub limit: usize,
}

impl SimilarityQuery {
    pub fn new(threshold: f32, limit: usize) -> Self {
        Self {
            kind: None,
            threshold,
            limit,
        }
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// One nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub entity_id: String,
    pub entity_kind: EntityKind,
    /// Cosine distance (1 - cosine similarity).
    pub distance: f32,
    /// 1 - distance.
    pub similarity: f32,
}
