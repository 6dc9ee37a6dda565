//! SQLite persistence.
//!
//! One [`SqliteStore`] implements every store trait plus the similarity
//! index, so a single connection serves the pipeline. Timestamps are stored
//! as fixed-precision RFC 3339 strings so they compare lexicographically;
//! structured payloads are stored as JSON text.

mod characters;
mod documents;
mod embeddings;
mod jobs;
mod scenes;

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FolioError, FolioResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id               TEXT PRIMARY KEY,
    owner_id         TEXT NOT NULL,
    title            TEXT,
    author           TEXT,
    language         TEXT,
    source_path      TEXT NOT NULL,
    source_format    TEXT NOT NULL,
    content_hash     TEXT NOT NULL,
    status           TEXT NOT NULL,
    previous_status  TEXT,
    progress_percent INTEGER NOT NULL DEFAULT 0,
    current_step     TEXT,
    error_message    TEXT,
    total_chapters   INTEGER NOT NULL DEFAULT 0,
    total_scenes     INTEGER NOT NULL DEFAULT 0,
    total_characters INTEGER NOT NULL DEFAULT 0,
    total_words      INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_owner_hash ON documents(owner_id, content_hash);

CREATE TABLE IF NOT EXISTS scenes (
    id                   TEXT PRIMARY KEY,
    document_id          TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    global_index         INTEGER NOT NULL,
    chapter_index        INTEGER NOT NULL,
    chapter_title        TEXT NOT NULL,
    scene_index          INTEGER NOT NULL,
    text                 TEXT NOT NULL,
    word_count           INTEGER NOT NULL,
    scene_type           TEXT NOT NULL,
    has_dialogue         INTEGER NOT NULL,
    estimated_characters INTEGER NOT NULL,
    speaker              TEXT,
    analysis_status      TEXT NOT NULL,
    analysis             TEXT,
    analysis_error       TEXT,
    analyzed_at          TEXT,
    created_at           TEXT NOT NULL,
    UNIQUE (document_id, global_index)
);
CREATE INDEX IF NOT EXISTS idx_scenes_document_status ON scenes(document_id, analysis_status);

CREATE TABLE IF NOT EXISTS characters (
    id                TEXT PRIMARY KEY,
    document_id       TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    name              TEXT NOT NULL,
    aliases           TEXT NOT NULL,
    role              TEXT NOT NULL,
    profile           TEXT NOT NULL,
    profile_source    TEXT NOT NULL,
    synthesis_error   TEXT,
    first_scene_id    TEXT,
    first_scene_index INTEGER NOT NULL,
    mention_count     INTEGER NOT NULL,
    scene_count       INTEGER NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_characters_document_name
    ON characters(document_id, name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS settings (
    id                TEXT PRIMARY KEY,
    document_id       TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    name              TEXT NOT NULL,
    description       TEXT NOT NULL,
    keywords          TEXT NOT NULL,
    scene_count       INTEGER NOT NULL,
    first_scene_index INTEGER NOT NULL,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_settings_document ON settings(document_id);

CREATE TABLE IF NOT EXISTS embeddings (
    entity_id   TEXT PRIMARY KEY,
    entity_kind TEXT NOT NULL,
    document_id TEXT NOT NULL,
    provider    TEXT NOT NULL,
    model       TEXT NOT NULL,
    dimensions  INTEGER NOT NULL,
    vector      TEXT NOT NULL,
    text_hash   TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_embeddings_document ON embeddings(document_id, entity_kind);

CREATE TABLE IF NOT EXISTS jobs (
    id           TEXT PRIMARY KEY,
    stage        TEXT NOT NULL,
    job_key      TEXT NOT NULL,
    payload      TEXT NOT NULL,
    status       TEXT NOT NULL,
    attempts     INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    run_after    TEXT NOT NULL,
    last_error   TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_key
    ON jobs(job_key) WHERE status IN ('queued', 'running');
CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(stage, status, run_after);
"#;

/// SQLite-backed store for every pipeline entity.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file. `":memory:"` opens a private
    /// in-memory database.
    pub fn open(db_path: impl AsRef<Path>) -> FolioResult<Self> {
        let path = db_path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()
        } else {
            // Ensure parent directory exists
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)
        }
        .map_err(|e| FolioError::database(e.to_string()))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, mainly for tests.
    pub fn in_memory() -> FolioResult<Self> {
        Self::open(":memory:")
    }

    fn migrate(&self) -> FolioResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> FolioResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FolioError::database("SQLite connection mutex poisoned"))
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> FolioResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

pub(crate) fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

pub(crate) fn get_opt_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| raw.parse().map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn get_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn get_opt_json<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn parse_error(idx: usize, message: impl Into<String>) -> rusqlite::Error {
    conversion_err(idx, FolioError::internal(message))
}
