use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use folio_extractors::SourceFormat;

use super::{fmt_ts, get_enum, get_opt_enum, get_ts, new_id, parse_error, SqliteStore};
use crate::error::{FolioError, FolioResult};
use crate::traits::DocumentStore;
use crate::types::{Document, DocumentStatus, NewDocument};

const DOCUMENT_COLUMNS: &str = "id, owner_id, title, author, language, source_path, source_format, \
     content_hash, status, previous_status, progress_percent, current_step, error_message, \
     total_chapters, total_scenes, total_characters, total_words, created_at, updated_at";

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let format: String = row.get(6)?;
    let source_format = SourceFormat::parse(&format)
        .ok_or_else(|| parse_error(6, format!("Unknown source format: {}", format)))?;

    Ok(Document {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        language: row.get(4)?,
        source_path: row.get(5)?,
        source_format,
        content_hash: row.get(7)?,
        status: get_enum(row, 8)?,
        previous_status: get_opt_enum(row, 9)?,
        progress_percent: row.get(10)?,
        current_step: row.get(11)?,
        error_message: row.get(12)?,
        total_chapters: row.get(13)?,
        total_scenes: row.get(14)?,
        total_characters: row.get(15)?,
        total_words: row.get(16)?,
        created_at: get_ts(row, 17)?,
        updated_at: get_ts(row, 18)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create_document(&self, document: NewDocument) -> FolioResult<Document> {
        let now = Utc::now();
        let record = Document {
            id: new_id(),
            owner_id: document.owner_id,
            title: document.title,
            author: None,
            language: None,
            source_path: document.source_path,
            source_format: document.source_format,
            content_hash: document.content_hash,
            status: DocumentStatus::Uploading,
            previous_status: None,
            progress_percent: 0,
            current_step: None,
            error_message: None,
            total_chapters: 0,
            total_scenes: 0,
            total_characters: 0,
            total_words: 0,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO documents ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                DOCUMENT_COLUMNS
            ),
            params![
                record.id,
                record.owner_id,
                record.title,
                record.author,
                record.language,
                record.source_path,
                record.source_format.as_str(),
                record.content_hash,
                record.status.to_string(),
                record.previous_status.map(|s| s.to_string()),
                record.progress_percent,
                record.current_step,
                record.error_message,
                record.total_chapters,
                record.total_scenes,
                record.total_characters,
                record.total_words,
                fmt_ts(&record.created_at),
                fmt_ts(&record.updated_at),
            ],
        )?;

        Ok(record)
    }

    async fn get_document(&self, document_id: &str) -> FolioResult<Option<Document>> {
        let conn = self.conn()?;
        let document = conn
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![document_id],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        content_hash: &str,
    ) -> FolioResult<Option<Document>> {
        let conn = self.conn()?;
        let document = conn
            .query_row(
                &format!(
                    "SELECT {} FROM documents WHERE owner_id = ?1 AND content_hash = ?2 \
                     ORDER BY created_at LIMIT 1",
                    DOCUMENT_COLUMNS
                ),
                params![owner_id, content_hash],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    async fn update_document(&self, document: &Document) -> FolioResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE documents SET title = ?2, author = ?3, language = ?4, status = ?5, \
             previous_status = ?6, progress_percent = ?7, current_step = ?8, error_message = ?9, \
             total_chapters = ?10, total_scenes = ?11, total_characters = ?12, total_words = ?13, \
             updated_at = ?14 WHERE id = ?1",
            params![
                document.id,
                document.title,
                document.author,
                document.language,
                document.status.to_string(),
                document.previous_status.map(|s| s.to_string()),
                document.progress_percent,
                document.current_step,
                document.error_message,
                document.total_chapters,
                document.total_scenes,
                document.total_characters,
                document.total_words,
                fmt_ts(&Utc::now()),
            ],
        )?;

        if changed == 0 {
            return Err(FolioError::document_not_found(&document.id));
        }
        Ok(())
    }

    async fn list_documents(&self, owner_id: &str) -> FolioResult<Vec<Document>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents WHERE owner_id = ?1 ORDER BY created_at DESC",
            DOCUMENT_COLUMNS
        ))?;
        let documents = stmt
            .query_map(params![owner_id], row_to_document)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_document(owner: &str, hash: &str) -> NewDocument {
        NewDocument {
            owner_id: owner.to_string(),
            title: Some("A Game of Thrones".to_string()),
            source_path: format!("{}/{}.epub", owner, hash),
            source_format: SourceFormat::Epub,
            content_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_document() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_document(new_document("alice", "abc")).await.unwrap();
        assert_eq!(created.status, DocumentStatus::Uploading);

        let loaded = store.get_document(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("A Game of Thrones"));
        assert_eq!(loaded.source_format, SourceFormat::Epub);
        assert_eq!(loaded.progress_percent, 0);

        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_content_hash_lookup_is_per_owner() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store.create_document(new_document("alice", "abc")).await.unwrap();

        let found = store.find_by_content_hash("alice", "abc").await.unwrap();
        assert_eq!(found.map(|d| d.id), Some(created.id));
        assert!(store.find_by_content_hash("bob", "abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_document_round_trips_status() {
        let store = SqliteStore::in_memory().unwrap();
        let mut document = store.create_document(new_document("alice", "abc")).await.unwrap();

        document.status = DocumentStatus::Failed;
        document.previous_status = Some(DocumentStatus::Analyzing);
        document.set_progress(42, "Analyzing scenes");
        document.error_message = Some("boom".to_string());
        document.total_words = 120_000;
        store.update_document(&document).await.unwrap();

        let loaded = store.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Failed);
        assert_eq!(loaded.previous_status, Some(DocumentStatus::Analyzing));
        assert_eq!(loaded.progress_percent, 42);
        assert_eq!(loaded.current_step.as_deref(), Some("Analyzing scenes"));
        assert_eq!(loaded.total_words, 120_000);
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let mut document = store.create_document(new_document("alice", "abc")).await.unwrap();
        document.id = "ghost".to_string();
        assert!(matches!(
            store.update_document(&document).await,
            Err(FolioError::NotFound { .. })
        ));
    }
}
