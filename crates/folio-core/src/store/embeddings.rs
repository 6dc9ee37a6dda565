use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, get_enum, get_json, get_ts, to_json, SqliteStore};
use crate::error::FolioResult;
use crate::traits::SimilarityIndex;
use crate::types::{EmbeddingRecord, EntityKind};

const EMBEDDING_COLUMNS: &str =
    "entity_id, entity_kind, document_id, provider, model, vector, text_hash, updated_at";

fn row_to_embedding(row: &Row<'_>) -> rusqlite::Result<EmbeddingRecord> {
    Ok(EmbeddingRecord {
        entity_id: row.get(0)?,
        entity_kind: get_enum(row, 1)?,
        document_id: row.get(2)?,
        provider: row.get(3)?,
        model: row.get(4)?,
        vector: get_json(row, 5)?,
        text_hash: row.get(6)?,
        updated_at: get_ts(row, 7)?,
    })
}

/// Brute-force index: vectors live as JSON next to their entity and ranking
/// happens in process, which is plenty for one book's characters.
#[async_trait]
impl SimilarityIndex for SqliteStore {
    async fn upsert_embedding(&self, record: EmbeddingRecord) -> FolioResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO embeddings (entity_id, entity_kind, document_id, provider, model, \
             dimensions, vector, text_hash, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(entity_id) DO UPDATE SET entity_kind = excluded.entity_kind, \
             document_id = excluded.document_id, provider = excluded.provider, \
             model = excluded.model, dimensions = excluded.dimensions, vector = excluded.vector, \
             text_hash = excluded.text_hash, updated_at = excluded.updated_at",
            params![
                record.entity_id,
                record.entity_kind.to_string(),
                record.document_id,
                record.provider,
                record.model,
                record.dimensions(),
                to_json(&record.vector)?,
                record.text_hash,
                fmt_ts(&record.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn get_embedding(&self, entity_id: &str) -> FolioResult<Option<EmbeddingRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM embeddings WHERE entity_id = ?1", EMBEDDING_COLUMNS),
                params![entity_id],
                row_to_embedding,
            )
            .optional()?;
        Ok(record)
    }

    async fn list_embeddings(
        &self,
        document_id: &str,
        kind: Option<EntityKind>,
    ) -> FolioResult<Vec<EmbeddingRecord>> {
        let conn = self.conn()?;
        let records = match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM embeddings WHERE document_id = ?1 AND entity_kind = ?2 \
                     ORDER BY entity_id",
                    EMBEDDING_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![document_id, kind.to_string()], row_to_embedding)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM embeddings WHERE document_id = ?1 ORDER BY entity_id",
                    EMBEDDING_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![document_id], row_to_embedding)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(records)
    }

    async fn delete_embedding(&self, entity_id: &str) -> FolioResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM embeddings WHERE entity_id = ?1", params![entity_id])?;
        Ok(())
    }

    async fn retain_embeddings(
        &self,
        document_id: &str,
        kind: EntityKind,
        keep_ids: &[String],
    ) -> FolioResult<usize> {
        let conn = self.conn()?;
        let existing: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT entity_id FROM embeddings WHERE document_id = ?1 AND entity_kind = ?2",
            )?;
            let ids = stmt
                .query_map(params![document_id, kind.to_string()], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            ids
        };

        let mut removed = 0;
        for id in existing.iter().filter(|id| !keep_ids.contains(id)) {
            removed += conn.execute("DELETE FROM embeddings WHERE entity_id = ?1", params![id])?;
        }
        Ok(removed)
    }
}
