//! Document status and progress reporting.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{FolioError, FolioResult};
use crate::events::{EventBus, PipelineEvent};
use crate::traits::PipelineStore;
use crate::types::{Document, DocumentStatus, Stage};

/// Writes status and progress to the Document row and mirrors each change
/// on the event bus.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn PipelineStore>,
    events: EventBus,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn PipelineStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Load a document or fail with `NotFound`.
    pub async fn load(&self, document_id: &str) -> FolioResult<Document> {
        self.store
            .get_document(document_id)
            .await?
            .ok_or_else(|| FolioError::document_not_found(document_id))
    }

    /// Move the document to `next`, rejecting transitions the state machine
    /// does not allow.
    pub async fn transition(&self, document: &mut Document, next: DocumentStatus) -> FolioResult<()> {
        let from = document.status;
        if !from.can_transition_to(next) {
            return Err(FolioError::invalid_transition(from, next));
        }

        document.status = next;
        self.store.update_document(document).await?;

        if from != next {
            info!(document_id = %document.id, %from, to = %next, "Document status changed");
            self.events
                .emit(PipelineEvent::status_changed(&document.id, from, next));
        }
        Ok(())
    }

    /// Mark the document failed. `resume` is the status a retry restores.
    pub async fn fail(
        &self,
        document: &mut Document,
        resume: DocumentStatus,
        message: impl Into<String>,
    ) -> FolioResult<()> {
        let message = message.into();
        document.previous_status = Some(resume);
        document.error_message = Some(message.clone());
        document.current_step = Some(format!("Failed: {}", message));
        self.transition(document, DocumentStatus::Failed).await
    }

    /// Record progress within a stage. `fraction` is the share of the
    /// stage's work done, mapped onto the stage's overall progress band.
    pub async fn report(
        &self,
        document: &mut Document,
        stage: Stage,
        fraction: f32,
        step: impl Into<String>,
    ) -> FolioResult<()> {
        let step = step.into();
        document.set_progress(stage.overall_progress(fraction), step.clone());
        self.store.update_document(document).await?;

        debug!(document_id = %document.id, %stage, percent = document.progress_percent, %step, "Progress");
        self.events.emit(PipelineEvent::progress(
            &document.id,
            stage,
            document.progress_percent,
            step,
        ));
        Ok(())
    }

    /// Persist field changes without a status or progress event.
    pub async fn save(&self, document: &Document) -> FolioResult<()> {
        self.store.update_document(document).await
    }
}

/// Emits a progress update every `total / milestones` items.
#[derive(Debug, Clone, Copy)]
pub struct Milestones {
    every: usize,
}

impl Milestones {
    pub fn new(total: usize, milestones: usize) -> Self {
        let milestones = milestones.max(1);
        Self {
            every: total.div_ceil(milestones).max(1),
        }
    }

    /// Whether the `done`-th item crosses a milestone.
    pub fn hit(&self, done: usize, total: usize) -> bool {
        done == total || done % self.every == 0
    }
}
