//! Persistence traits for documents, scenes, characters and jobs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FolioResult;
use crate::types::{
    AnalysisCounts, AnalysisStatus, Character, Document, EnqueueOutcome, JobRecord, NewDocument,
    NewScene, Scene, SceneAnalysisUpdate, Setting, Stage, StagePayload,
};

/// Document rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document in `uploading` state.
    async fn create_document(&self, document: NewDocument) -> FolioResult<Document>;

    async fn get_document(&self, document_id: &str) -> FolioResult<Option<Document>>;

    /// Find an owner's document by source content hash.
    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        content_hash: &str,
    ) -> FolioResult<Option<Document>>;

    /// Write every mutable field of the document back.
    async fn update_document(&self, document: &Document) -> FolioResult<()>;

    async fn list_documents(&self, owner_id: &str) -> FolioResult<Vec<Document>>;
}

/// Scene rows.
#[async_trait]
pub trait SceneStore: Send + Sync {
    /// Atomically replace all scenes of a document. Returns the count stored.
    async fn replace_scenes(&self, document_id: &str, scenes: Vec<NewScene>) -> FolioResult<usize>;

    /// All scenes ordered by global index.
    async fn list_scenes(&self, document_id: &str) -> FolioResult<Vec<Scene>>;

    /// Scenes in any of the given statuses, ordered by global index.
    async fn list_scenes_with_status(
        &self,
        document_id: &str,
        statuses: &[AnalysisStatus],
    ) -> FolioResult<Vec<Scene>>;

    async fn get_scene(&self, scene_id: &str) -> FolioResult<Option<Scene>>;

    /// Record an analysis transition; rejects backward moves.
    async fn update_scene_analysis(
        &self,
        scene_id: &str,
        update: SceneAnalysisUpdate,
    ) -> FolioResult<()>;

    async fn analysis_counts(&self, document_id: &str) -> FolioResult<AnalysisCounts>;
}

/// Character and setting rows.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    /// Upsert the document's characters and delete those no longer present.
    async fn replace_characters(
        &self,
        document_id: &str,
        characters: Vec<Character>,
    ) -> FolioResult<usize>;

    /// Characters ordered by first appearance.
    async fn list_characters(&self, document_id: &str) -> FolioResult<Vec<Character>>;

    async fn get_character(&self, character_id: &str) -> FolioResult<Option<Character>>;

    /// Upsert the document's settings and delete those no longer present.
    async fn replace_settings(&self, document_id: &str, settings: Vec<Setting>)
        -> FolioResult<usize>;

    async fn list_settings(&self, document_id: &str) -> FolioResult<Vec<Setting>>;
}

/// Everything the pipeline stages read and write.
pub trait PipelineStore: DocumentStore + SceneStore + CharacterStore {}

impl<T: DocumentStore + SceneStore + CharacterStore> PipelineStore for T {}

/// Durable stage jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job unless one with the same key is queued or running.
    async fn enqueue_job(
        &self,
        stage: Stage,
        payload: &StagePayload,
        max_attempts: u32,
    ) -> FolioResult<EnqueueOutcome>;

    /// Claim the oldest due job of a stage, marking it running and
    /// counting the attempt.
    async fn claim_next(&self, stage: Stage, now: DateTime<Utc>) -> FolioResult<Option<JobRecord>>;

    async fn complete_job(&self, job_id: &str) -> FolioResult<()>;

    /// Put a job back in the queue to run after `run_after`.
    async fn reschedule_job(
        &self,
        job_id: &str,
        run_after: DateTime<Utc>,
        error: &str,
    ) -> FolioResult<()>;

    async fn fail_job(&self, job_id: &str, error: &str) -> FolioResult<()>;

    async fn get_job(&self, job_id: &str) -> FolioResult<Option<JobRecord>>;

    /// The queued or running job for a document and stage, if any.
    async fn active_job(&self, stage: Stage, document_id: &str) -> FolioResult<Option<JobRecord>>;

    /// Return jobs left `running` by a dead worker to the queue.
    async fn requeue_stale(&self) -> FolioResult<usize>;
}
