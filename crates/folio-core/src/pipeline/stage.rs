//! Stage handler seam.

use std::sync::Arc;

use async_trait::async_trait;

use super::ProgressReporter;
use crate::config::FolioConfig;
use crate::error::FolioResult;
use crate::traits::{
    Embedder, Llm, ObjectStore, PipelineStore, ProviderFactory, ProviderRequest, SimilarityIndex,
};
use crate::types::{Document, Stage, StagePayload};

/// Everything a stage handler may touch.
pub struct StageContext {
    pub store: Arc<dyn PipelineStore>,
    pub index: Arc<dyn SimilarityIndex>,
    pub objects: Arc<dyn ObjectStore>,
    pub providers: Arc<dyn ProviderFactory>,
    pub config: Arc<FolioConfig>,
    pub progress: ProgressReporter,
}

impl StageContext {
    /// Resolve the LLM for this run. Credentials are looked up now, never
    /// carried over from an earlier stage.
    pub async fn llm(&self, payload: &StagePayload) -> FolioResult<Arc<dyn Llm>> {
        self.providers.llm(&provider_request(payload)).await
    }

    pub async fn embedder(&self, payload: &StagePayload) -> FolioResult<Arc<dyn Embedder>> {
        // provider/model in the payload name the LLM, not the embedder
        let request = ProviderRequest::new(&payload.caller_id);
        self.providers.embedder(&request).await
    }
}

fn provider_request(payload: &StagePayload) -> ProviderRequest {
    ProviderRequest::new(&payload.caller_id)
        .with_provider(payload.provider.clone())
        .with_model(payload.model.clone())
}

/// Summary of a successful stage run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutcome {
    /// Items produced or processed.
    pub items: usize,
    /// Items that failed without failing the stage.
    pub item_errors: usize,
    /// Stage to enqueue next, if any.
    pub follow_up: Option<Stage>,
}

/// One pipeline stage.
///
/// The orchestrator moves the document into the stage's running status
/// before calling [`execute`](StageHandler::execute); the handler sets the
/// final status itself, since a run may legitimately end somewhere other
/// than the success status (a capped analysis run returns to
/// `scenes_detected`).
#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    async fn execute(
        &self,
        ctx: &StageContext,
        document: &mut Document,
        payload: &StagePayload,
    ) -> FolioResult<StageOutcome>;
}
