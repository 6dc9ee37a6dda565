//! Stage 2: per-scene LLM analysis.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use super::progress::Milestones;
use super::stage::{StageContext, StageHandler, StageOutcome};
use crate::error::{FolioError, FolioResult};
use crate::traits::Llm;
use crate::types::{AnalysisStatus, Document, DocumentStatus, Scene, SceneAnalysisUpdate, Stage, StagePayload};

/// Scene statuses an analysis run picks up.
const OUTSTANDING: [AnalysisStatus; 3] = [
    AnalysisStatus::Pending,
    AnalysisStatus::Processing,
    AnalysisStatus::Failed,
];

/// Analyzes every scene that has no completed analysis yet.
///
/// Completed scenes are never sent to the model again, so a retry only pays
/// for the scenes that failed or were interrupted.
#[derive(Debug, Default)]
pub struct AnalysisStage;

#[async_trait]
impl StageHandler for AnalysisStage {
    fn stage(&self) -> Stage {
        Stage::Analysis
    }

    #[instrument(skip_all, fields(document_id = %document.id, stage = "analysis"))]
    async fn execute(
        &self,
        ctx: &StageContext,
        document: &mut Document,
        payload: &StagePayload,
    ) -> FolioResult<StageOutcome> {
        let stage = Stage::Analysis;
        let llm = ctx.llm(payload).await?;
        if !llm.check_health().await? {
            return Err(FolioError::llm_unhealthy(format!(
                "Provider '{}' is not reachable",
                llm.provider_name()
            )));
        }

        let mut scenes = ctx
            .store
            .list_scenes_with_status(&document.id, &OUTSTANDING)
            .await?;
        if let Some(limit) = payload.limit {
            scenes.truncate(limit);
        }

        let counts = ctx.store.analysis_counts(&document.id).await?;
        let total = counts.total().max(1) as usize;
        let already_done = counts.completed as usize;
        let batch = scenes.len();

        info!(
            batch,
            completed = already_done,
            model = llm.model_name(),
            "Starting scene analysis"
        );
        ctx.progress
            .report(
                document,
                stage,
                already_done as f32 / total as f32,
                format!("Analyzing {} scenes", batch),
            )
            .await?;

        let delay = Duration::from_millis(ctx.config.analysis.inter_call_delay_ms);
        let concurrency = ctx.config.analysis.concurrency.max(1);
        let milestones = Milestones::new(batch, ctx.config.analysis.progress_milestones);

        let mut results = stream::iter(scenes)
            .map(|scene| analyze_scene(ctx, llm.clone(), scene, delay))
            .buffer_unordered(concurrency);

        let mut processed = 0usize;
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        while let Some(result) = results.next().await {
            // a stage-level error aborts the run; finished scenes stay completed
            if result? {
                succeeded += 1;
            } else {
                failed += 1;
            }
            processed += 1;

            if milestones.hit(processed, batch) {
                ctx.progress
                    .report(
                        document,
                        stage,
                        (already_done + succeeded) as f32 / total as f32,
                        format!("Analyzed {} of {} scenes", processed, batch),
                    )
                    .await?;
            }
        }
        drop(results);

        let counts = ctx.store.analysis_counts(&document.id).await?;
        let unfinished = counts.pending + counts.processing;
        let step = if counts.failed > 0 {
            format!("Analysis completed with {} error(s)", counts.failed)
        } else if unfinished > 0 {
            format!("Analyzed {} of {} scenes", counts.completed, counts.total())
        } else {
            "Analysis complete".to_string()
        };

        document.error_message = (counts.failed > 0)
            .then(|| format!("{} scene(s) failed analysis", counts.failed));
        document.set_progress(
            stage.overall_progress(counts.completed as f32 / total as f32),
            step,
        );

        let next = if unfinished > 0 {
            // capped run: the rest is picked up by the next request
            DocumentStatus::ScenesDetected
        } else {
            DocumentStatus::Analyzed
        };
        ctx.progress.transition(document, next).await?;

        info!(
            succeeded,
            failed,
            remaining = unfinished,
            status = %next,
            "Scene analysis finished"
        );

        let follow_up = (ctx.config.analysis.auto_discover
            && next == DocumentStatus::Analyzed
            && counts.completed > 0)
            .then_some(Stage::Discovery);

        Ok(StageOutcome {
            items: succeeded,
            item_errors: failed,
            follow_up,
        })
    }
}

/// Analyze one scene. `Ok(false)` means the scene failed on its own and the
/// batch continues; `Err` aborts the stage.
async fn analyze_scene(
    ctx: &StageContext,
    llm: Arc<dyn Llm>,
    scene: Scene,
    delay: Duration,
) -> FolioResult<bool> {
    ctx.store
        .update_scene_analysis(&scene.id, SceneAnalysisUpdate::Started)
        .await?;

    let chapter = (!scene.chapter_title.is_empty()).then_some(scene.chapter_title.as_str());
    let result = llm.analyze_scene(&scene.text, chapter).await;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match result {
        Ok(analysis) => {
            debug!(
                scene = scene.global_index,
                characters = analysis.characters.len(),
                "Scene analyzed"
            );
            ctx.store
                .update_scene_analysis(&scene.id, SceneAnalysisUpdate::Completed(analysis))
                .await?;
            Ok(true)
        }
        Err(e) if e.is_item_level() => {
            warn!(scene = scene.global_index, error = %e, "Scene analysis failed");
            ctx.store
                .update_scene_analysis(&scene.id, SceneAnalysisUpdate::Failed(e.to_string()))
                .await?;
            Ok(false)
        }
        Err(e) => {
            ctx.store
                .update_scene_analysis(&scene.id, SceneAnalysisUpdate::Failed(e.to_string()))
                .await?;
            Err(e)
        }
    }
}
