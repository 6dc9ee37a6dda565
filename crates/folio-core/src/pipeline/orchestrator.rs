//! Pipeline orchestrator.
//!
//! Owns the stores, the job queues and the stage handlers. Callers ingest
//! documents and trigger stages here; workers call [`Orchestrator::run_next`]
//! to execute queued jobs.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use strum::IntoEnumIterator;
use tracing::{debug, error, info, warn};

use folio_extractors::SourceFormat;

use super::analysis::AnalysisStage;
use super::discovery::DiscoveryStage;
use super::progress::ProgressReporter;
use super::queue::JobQueue;
use super::segmentation::SegmentationStage;
use super::stage::{StageContext, StageHandler, StageOutcome};
use crate::config::FolioConfig;
use crate::error::{FolioError, FolioResult};
use crate::events::{EventBus, PipelineEvent};
use crate::storage::LocalFsStore;
use crate::store::SqliteStore;
use crate::traits::{
    JobStore, ObjectMetadata, ObjectStore, PipelineStore, ProviderFactory, SimilarityIndex,
};
use crate::types::{
    Character, Document, DocumentStatus, EnqueueOutcome, EntityKind, JobRecord, NewDocument,
    Scene, Setting, SimilarityQuery, Stage, StagePayload,
};

/// An uploaded source file.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: String,
    /// Original file name; used to detect the format when no MIME type is given.
    pub file_name: String,
    pub content: Vec<u8>,
    pub title: Option<String>,
    pub content_type: Option<String>,
}

impl IngestRequest {
    pub fn new(
        owner_id: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            file_name: file_name.into(),
            content: content.into(),
            title: None,
            content_type: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Result of an ingest call.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// A new document was created and segmentation enqueued.
    Created(Document),
    /// The owner already uploaded identical bytes.
    Duplicate(Document),
}

impl IngestOutcome {
    pub fn document(&self) -> &Document {
        match self {
            IngestOutcome::Created(doc) | IngestOutcome::Duplicate(doc) => doc,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Duplicate(_))
    }
}

/// A character similar to a query character.
#[derive(Debug, Clone)]
pub struct SimilarCharacter {
    pub character: Character,
    pub similarity: f32,
    pub distance: f32,
}

/// Drives documents through segmentation, analysis and discovery.
pub struct Orchestrator {
    config: Arc<FolioConfig>,
    store: Arc<dyn PipelineStore>,
    index: Arc<dyn SimilarityIndex>,
    objects: Arc<dyn ObjectStore>,
    queue: JobQueue,
    ctx: StageContext,
    handlers: HashMap<Stage, Arc<dyn StageHandler>>,
}

impl Orchestrator {
    pub fn new(
        config: FolioConfig,
        store: Arc<dyn PipelineStore>,
        jobs: Arc<dyn JobStore>,
        index: Arc<dyn SimilarityIndex>,
        objects: Arc<dyn ObjectStore>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        let config = Arc::new(config);
        let progress = ProgressReporter::new(store.clone(), EventBus::new());
        let queue = JobQueue::new(jobs, config.queues.clone());
        let ctx = StageContext {
            store: store.clone(),
            index: index.clone(),
            objects: objects.clone(),
            providers,
            config: config.clone(),
            progress,
        };

        let mut orchestrator = Self {
            config,
            store,
            index,
            objects,
            queue,
            ctx,
            handlers: HashMap::new(),
        };
        orchestrator.register(Arc::new(SegmentationStage));
        orchestrator.register(Arc::new(AnalysisStage));
        orchestrator.register(Arc::new(DiscoveryStage));
        orchestrator
    }

    /// Orchestrator over a SQLite database and a local storage root, both
    /// taken from `config`.
    pub fn with_sqlite(config: FolioConfig, providers: Arc<dyn ProviderFactory>) -> FolioResult<Self> {
        let store = Arc::new(SqliteStore::open(&config.database_path)?);
        let objects = Arc::new(LocalFsStore::new(config.storage_root.clone()));
        Ok(Self::new(
            config,
            store.clone(),
            store.clone(),
            store,
            objects,
            providers,
        ))
    }

    /// Replace the handler of a stage.
    pub fn with_handler(mut self, handler: Arc<dyn StageHandler>) -> Self {
        self.register(handler);
        self
    }

    fn register(&mut self, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(handler.stage(), handler);
    }

    pub fn config(&self) -> &FolioConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        self.ctx.progress.events()
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    // ---- Ingest and triggers ----

    /// Store an uploaded file and start segmentation.
    ///
    /// Identical bytes uploaded again by the same owner return the existing
    /// document without enqueuing anything.
    pub async fn ingest(&self, request: IngestRequest) -> FolioResult<IngestOutcome> {
        if request.owner_id.trim().is_empty() {
            return Err(FolioError::validation("Owner id is required"));
        }
        if request.content.is_empty() {
            return Err(FolioError::validation(format!(
                "Uploaded file '{}' is empty",
                request.file_name
            )));
        }

        let format = request
            .content_type
            .as_deref()
            .and_then(SourceFormat::from_mime)
            .or_else(|| SourceFormat::from_path(&request.file_name))
            .ok_or_else(|| {
                FolioError::validation_with_suggestion(
                    format!("Cannot determine the format of '{}'", request.file_name),
                    "Upload an .epub or .txt file",
                )
            })?;

        let content_hash = hex::encode(Sha256::digest(&request.content));
        if let Some(existing) = self
            .store
            .find_by_content_hash(&request.owner_id, &content_hash)
            .await?
        {
            info!(document_id = %existing.id, owner_id = %request.owner_id, "Duplicate upload");
            return Ok(IngestOutcome::Duplicate(existing));
        }

        let source_path = format!(
            "{}/{}.{}",
            request.owner_id,
            content_hash,
            file_extension(format)
        );
        let metadata: ObjectMetadata = HashMap::from([
            ("owner_id".to_string(), request.owner_id.clone()),
            ("file_name".to_string(), request.file_name.clone()),
            ("content_hash".to_string(), content_hash.clone()),
            ("source_format".to_string(), format.as_str().to_string()),
        ]);
        self.objects
            .upload(&source_path, &request.content, metadata)
            .await?;

        let document = self
            .store
            .create_document(NewDocument {
                owner_id: request.owner_id.clone(),
                title: request.title,
                source_path,
                source_format: format,
                content_hash,
            })
            .await?;
        info!(
            document_id = %document.id,
            file_name = %request.file_name,
            bytes = request.content.len(),
            "Ingested document"
        );

        self.queue
            .enqueue(
                Stage::Segmentation,
                &StagePayload::new(&document.id, &request.owner_id),
            )
            .await?;
        Ok(IngestOutcome::Created(document))
    }

    /// Enqueue a stage for a document.
    ///
    /// Rejected unless the document is in a status the stage starts from;
    /// a no-op when the stage is already queued or running for it.
    pub async fn enqueue_stage(
        &self,
        stage: Stage,
        payload: StagePayload,
    ) -> FolioResult<EnqueueOutcome> {
        let document = self.ctx.progress.load(&payload.document_id).await?;
        if !stage.accepts(document.status) {
            return Err(FolioError::invalid_state(format!(
                "Cannot start {} while document is '{}'",
                stage, document.status
            )));
        }
        self.queue.enqueue(stage, &payload).await
    }

    /// Resume a document after a failure or an interrupted stage.
    ///
    /// A failed document returns to the status it failed from. Only
    /// outstanding work is re-run: completed scenes are never analyzed again.
    pub async fn retry(&self, document_id: &str, caller_id: &str) -> FolioResult<EnqueueOutcome> {
        self.retry_with(StagePayload::new(document_id, caller_id)).await
    }

    /// [`retry`](Self::retry) with an explicit provider, model or limit.
    pub async fn retry_with(&self, payload: StagePayload) -> FolioResult<EnqueueOutcome> {
        let mut document = self.ctx.progress.load(&payload.document_id).await?;

        if document.status == DocumentStatus::Failed {
            let resume = document.previous_status.unwrap_or(DocumentStatus::Uploading);
            document.error_message = None;
            document.previous_status = None;
            document.current_step = Some(format!("Retrying from {}", resume));
            self.ctx.progress.transition(&mut document, resume).await?;
        }

        let stage = match document.status {
            DocumentStatus::Analyzed => {
                let counts = self.store.analysis_counts(&document.id).await?;
                if counts.outstanding() > 0 {
                    Stage::Analysis
                } else {
                    Stage::Discovery
                }
            }
            status => Stage::for_status(status).ok_or_else(|| {
                FolioError::invalid_state(format!("Nothing to retry for a document in '{}'", status))
            })?,
        };

        info!(document_id = %document.id, %stage, "Retrying document");
        self.queue.enqueue(stage, &payload).await
    }

    // ---- Read models ----

    pub async fn document(&self, document_id: &str) -> FolioResult<Document> {
        self.ctx.progress.load(document_id).await
    }

    pub async fn documents(&self, owner_id: &str) -> FolioResult<Vec<Document>> {
        self.store.list_documents(owner_id).await
    }

    /// Scenes in reading order, once segmentation has completed.
    pub async fn scenes(&self, document_id: &str) -> FolioResult<Vec<Scene>> {
        let document = self.document(document_id).await?;
        let segmented = document.total_scenes > 0
            && !matches!(
                document.status,
                DocumentStatus::Uploading | DocumentStatus::Parsing
            );
        if !segmented {
            return Err(FolioError::invalid_state(format!(
                "Scenes are not available while document is '{}'",
                document.status
            )));
        }
        self.store.list_scenes(document_id).await
    }

    /// Characters by first appearance, once discovery has completed.
    pub async fn characters(&self, document_id: &str) -> FolioResult<Vec<Character>> {
        self.ensure_discovered(document_id).await?;
        self.store.list_characters(document_id).await
    }

    pub async fn settings(&self, document_id: &str) -> FolioResult<Vec<Setting>> {
        self.ensure_discovered(document_id).await?;
        self.store.list_settings(document_id).await
    }

    async fn ensure_discovered(&self, document_id: &str) -> FolioResult<()> {
        let document = self.document(document_id).await?;
        let discovered = document.total_characters > 0
            || matches!(
                document.status,
                DocumentStatus::CharactersDiscovered
                    | DocumentStatus::Generating
                    | DocumentStatus::Completed
            );
        if !discovered {
            return Err(FolioError::invalid_state(format!(
                "Characters are not available while document is '{}'",
                document.status
            )));
        }
        Ok(())
    }

    /// Characters of the same document whose profiles resemble `character_id`.
    ///
    /// `None` uses the configured default threshold and limit.
    pub async fn similar_characters(
        &self,
        character_id: &str,
        threshold: Option<f32>,
        limit: Option<usize>,
    ) -> FolioResult<Vec<SimilarCharacter>> {
        if self.store.get_character(character_id).await?.is_none() {
            return Err(FolioError::character_not_found(character_id));
        }

        let query = SimilarityQuery::new(
            threshold.unwrap_or(self.config.similarity.default_threshold),
            limit.unwrap_or(self.config.similarity.default_limit),
        )
        .with_kind(EntityKind::Character);
        let matches = self.index.find_similar(character_id, &query).await?;

        let mut similar = Vec::with_capacity(matches.len());
        for m in matches {
            match self.store.get_character(&m.entity_id).await? {
                Some(character) => similar.push(SimilarCharacter {
                    character,
                    similarity: m.similarity,
                    distance: m.distance,
                }),
                None => debug!(entity_id = %m.entity_id, "Skipping embedding of deleted character"),
            }
        }
        Ok(similar)
    }

    // ---- Generation hand-off ----

    /// Hand a discovered document to the image generator.
    pub async fn begin_generation(&self, document_id: &str) -> FolioResult<Document> {
        let mut document = self.document(document_id).await?;
        document.error_message = None;
        document.set_progress(100, "Generating images");
        self.ctx
            .progress
            .transition(&mut document, DocumentStatus::Generating)
            .await?;
        Ok(document)
    }

    /// Record the generator's result. A failure returns the document to
    /// `characters_discovered` so generation can be requested again.
    pub async fn finish_generation(
        &self,
        document_id: &str,
        result: Result<(), String>,
    ) -> FolioResult<Document> {
        let mut document = self.document(document_id).await?;
        let next = match result {
            Ok(()) => {
                document.error_message = None;
                document.set_progress(100, "Completed");
                DocumentStatus::Completed
            }
            Err(message) => {
                warn!(document_id, error = %message, "Image generation failed");
                document.set_progress(100, format!("Generation failed: {}", message));
                document.error_message = Some(message);
                DocumentStatus::CharactersDiscovered
            }
        };
        self.ctx.progress.transition(&mut document, next).await?;
        Ok(document)
    }

    // ---- Job execution ----

    /// Claim and run one due job of `stage`. Returns whether a job ran.
    pub async fn run_next(&self, stage: Stage) -> FolioResult<bool> {
        match self.queue.claim(stage).await? {
            Some(job) => {
                self.run_job(job).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run due jobs of every stage until none is left. Returns the count run.
    pub async fn run_pending(&self) -> FolioResult<usize> {
        let mut ran = 0;
        loop {
            let before = ran;
            for stage in Stage::iter() {
                while self.run_next(stage).await? {
                    ran += 1;
                }
            }
            if ran == before {
                return Ok(ran);
            }
        }
    }

    /// Execute a claimed job and settle its outcome.
    ///
    /// Only queue and store bookkeeping failures are returned; stage errors
    /// are recorded on the job and the document.
    pub async fn run_job(&self, job: JobRecord) -> FolioResult<()> {
        let stage = job.stage;
        let Some(handler) = self.handlers.get(&stage).cloned() else {
            let err = FolioError::internal(format!("No handler registered for {}", stage));
            self.queue.fail(&job, &err).await?;
            return Err(err);
        };

        let mut document = match self.store.get_document(&job.payload.document_id).await? {
            Some(document) => document,
            None => {
                let err = FolioError::document_not_found(&job.payload.document_id);
                error!(job_id = %job.id, %stage, error = %err, "Job references a missing document");
                return self.queue.fail(&job, &err).await;
            }
        };

        if !stage.accepts(document.status) {
            let err = FolioError::invalid_state(format!(
                "Cannot run {} while document is '{}'",
                stage, document.status
            ));
            warn!(job_id = %job.id, document_id = %document.id, error = %err, "Dropping job");
            self.queue.fail(&job, &err).await?;
            self.events()
                .emit(PipelineEvent::error(&document.id, stage, err.user_message(), false));
            return Ok(());
        }

        info!(
            job_id = %job.id,
            document_id = %document.id,
            %stage,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            "Running job"
        );

        let result = self.execute(handler.as_ref(), &mut document, &job).await;
        match result {
            Ok(outcome) => self.settle_success(&job, &document, outcome).await,
            Err(err) => self.settle_failure(&job, err).await,
        }
    }

    async fn execute(
        &self,
        handler: &dyn StageHandler,
        document: &mut Document,
        job: &JobRecord,
    ) -> FolioResult<StageOutcome> {
        let stage = handler.stage();
        document.set_progress(
            document.progress_percent.max(stage.overall_progress(0.0)),
            format!("Starting {}", stage),
        );
        self.ctx
            .progress
            .transition(document, stage.running_status())
            .await?;
        handler.execute(&self.ctx, document, &job.payload).await
    }

    async fn settle_success(
        &self,
        job: &JobRecord,
        document: &Document,
        outcome: StageOutcome,
    ) -> FolioResult<()> {
        self.queue.complete(job).await?;
        info!(
            job_id = %job.id,
            document_id = %document.id,
            stage = %job.stage,
            items = outcome.items,
            item_errors = outcome.item_errors,
            "Job completed"
        );
        self.events().emit(PipelineEvent::completed(
            &document.id,
            job.stage,
            outcome.items,
            outcome.item_errors,
        ));

        if let Some(next) = outcome.follow_up {
            let payload = StagePayload {
                limit: None,
                ..job.payload.clone()
            };
            if let Err(e) = self.enqueue_stage(next, payload).await {
                warn!(document_id = %document.id, stage = %next, error = %e, "Could not enqueue follow-up stage");
            }
        }
        Ok(())
    }

    /// Retry, fail or roll back after a stage error.
    async fn settle_failure(&self, job: &JobRecord, err: FolioError) -> FolioResult<()> {
        let stage = job.stage;
        let message = err.user_message();
        let document = self.store.get_document(&job.payload.document_id).await?;

        if err.is_retryable() && !job.attempts_exhausted() {
            let delay = self.queue.retry_delay(job, &err);
            warn!(
                job_id = %job.id,
                %stage,
                attempt = job.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Stage failed, retrying"
            );
            self.queue.reschedule(job, delay, &err).await?;

            if let Some(mut document) = document {
                document.error_message = Some(message.clone());
                document.current_step = Some(format!(
                    "Retrying {} in {}s (attempt {} of {})",
                    stage,
                    delay.as_secs().max(1),
                    job.attempts + 1,
                    job.max_attempts
                ));
                self.ctx.progress.save(&document).await?;
                self.events()
                    .emit(PipelineEvent::error(&document.id, stage, message, true));
            }
            return Ok(());
        }

        error!(
            job_id = %job.id,
            %stage,
            attempts = job.attempts,
            credential = err.is_credential_error(),
            error = %err,
            "Stage failed"
        );
        self.queue.fail(job, &err).await?;

        let Some(mut document) = document else {
            return Ok(());
        };

        let rollback = stage.rollback_status();
        if err.is_credential_error()
            || err.is_fatal()
            || rollback == DocumentStatus::Failed
            || !document.status.can_transition_to(rollback)
        {
            self.ctx
                .progress
                .fail(&mut document, stage.entry_status(), message.clone())
                .await?;
        } else {
            // keep partial progress; the user retries only what is outstanding
            document.error_message = Some(message.clone());
            document.current_step = Some(format!("{} failed: {}", stage, message));
            self.ctx.progress.transition(&mut document, rollback).await?;
        }

        self.events()
            .emit(PipelineEvent::error(&document.id, stage, message, false));
        Ok(())
    }
}

fn file_extension(format: SourceFormat) -> &'static str {
    match format {
        SourceFormat::Epub => "epub",
        SourceFormat::PlainText => "txt",
    }
}
