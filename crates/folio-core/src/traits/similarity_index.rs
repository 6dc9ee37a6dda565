//! Similarity index trait.

use async_trait::async_trait;

use crate::error::{FolioError, FolioResult};
use crate::similarity::rank_candidates;
use crate::types::{EmbeddingRecord, EntityKind, SimilarityMatch, SimilarityQuery};

/// Stores one embedding per entity and answers nearest-neighbor queries.
///
/// Backends implement the storage operations; ranking is shared through the
/// provided methods so every backend applies the same (provider, model)
/// and dimensionality rules.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Insert or replace the embedding for `record.entity_id`.
    async fn upsert_embedding(&self, record: EmbeddingRecord) -> FolioResult<()>;

    async fn get_embedding(&self, entity_id: &str) -> FolioResult<Option<EmbeddingRecord>>;

    /// All embeddings of a document, optionally restricted to one kind.
    async fn list_embeddings(
        &self,
        document_id: &str,
        kind: Option<EntityKind>,
    ) -> FolioResult<Vec<EmbeddingRecord>>;

    async fn delete_embedding(&self, entity_id: &str) -> FolioResult<()>;

    /// Remove embeddings whose entity no longer exists. Returns the count removed.
    async fn retain_embeddings(
        &self,
        document_id: &str,
        kind: EntityKind,
        keep_ids: &[String],
    ) -> FolioResult<usize>;

    /// Entities of the same document most similar to `entity_id`, excluding itself.
    async fn find_similar(
        &self,
        entity_id: &str,
        query: &SimilarityQuery,
    ) -> FolioResult<Vec<SimilarityMatch>> {
        let anchor = self
            .get_embedding(entity_id)
            .await?
            .ok_or_else(|| FolioError::NotFound {
                message: format!("No embedding for entity {}", entity_id),
                code: crate::error::ErrorCode::CharacterNotFound,
                entity_id: Some(entity_id.to_string()),
            })?;

        let candidates = self.list_embeddings(&anchor.document_id, query.kind).await?;
        let candidates = candidates.into_iter().filter(|c| c.entity_id != anchor.entity_id);

        rank_candidates(
            &anchor.vector,
            &anchor.provider,
            &anchor.model,
            candidates,
            query,
        )
    }

    /// Rank a document's embeddings against an arbitrary query vector.
    async fn search_by_vector(
        &self,
        document_id: &str,
        vector: &[f32],
        provider: &str,
        model: &str,
        query: &SimilarityQuery,
    ) -> FolioResult<Vec<SimilarityMatch>> {
        let candidates = self.list_embeddings(document_id, query.kind).await?;
        rank_candidates(vector, provider, model, candidates.into_iter(), query)
    }
}
