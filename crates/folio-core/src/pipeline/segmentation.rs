//! Stage 1: extraction and scene segmentation.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use folio_extractors::{ChapterFilter, ExtractorFactory};

use super::stage::{StageContext, StageHandler, StageOutcome};
use crate::error::{ErrorCode, FolioError, FolioResult};
use crate::segmenter::SceneSegmenter;
use crate::types::{Document, DocumentStatus, Stage, StagePayload};

/// Downloads the source, extracts story chapters and persists scenes.
#[derive(Debug, Default)]
pub struct SegmentationStage;

#[async_trait]
impl StageHandler for SegmentationStage {
    fn stage(&self) -> Stage {
        Stage::Segmentation
    }

    #[instrument(skip_all, fields(document_id = %document.id, stage = "segmentation"))]
    async fn execute(
        &self,
        ctx: &StageContext,
        document: &mut Document,
        _payload: &StagePayload,
    ) -> FolioResult<StageOutcome> {
        let stage = Stage::Segmentation;

        ctx.progress
            .report(document, stage, 0.0, "Downloading source document")
            .await?;
        let bytes = ctx.objects.download(&document.source_path).await.map_err(|e| {
            if e.code() == ErrorCode::StoObjectMissing {
                // nothing to retry against
                FolioError::NotFound {
                    message: format!("Source file missing: {}", document.source_path),
                    code: ErrorCode::StoObjectMissing,
                    entity_id: Some(document.id.clone()),
                }
            } else {
                e
            }
        })?;

        ctx.progress
            .report(document, stage, 0.25, "Extracting chapters")
            .await?;
        let book = ExtractorFactory::for_format(document.source_format)
            .extract(&bytes)
            .await?;

        let source_chapters = book.chapters.len();
        let filtered =
            ChapterFilter::with_min_words(ctx.config.extraction.min_chapter_words).apply(book.chapters);
        for skipped in &filtered.skipped {
            info!(title = %skipped.chapter.title, reason = ?skipped.reason, "Skipped chapter");
        }
        if filtered.kept.is_empty() {
            return Err(FolioError::extraction(format!(
                "No story chapters found among {} extracted sections",
                source_chapters
            )));
        }

        ctx.progress
            .report(
                document,
                stage,
                0.5,
                format!("Segmenting {} chapters", filtered.kept.len()),
            )
            .await?;
        let scenes = SceneSegmenter::new().segment(&filtered.kept);
        if scenes.is_empty() {
            return Err(FolioError::extraction("Chapters contained no scene text"));
        }

        let stored = ctx.store.replace_scenes(&document.id, scenes).await?;
        if stored == 0 {
            warn!(document_id = %document.id, "No scenes stored");
        }

        document.title = document.title.take().or(book.metadata.title);
        document.author = document.author.take().or(book.metadata.author);
        document.language = document.language.take().or(book.metadata.language);
        document.total_chapters = filtered.kept.len() as u32;
        document.total_scenes = stored as u32;
        document.total_words = filtered.kept.iter().map(|c| c.word_count as u64).sum();
        document.error_message = None;
        document.set_progress(
            stage.overall_progress(1.0),
            format!(
                "Detected {} scenes in {} chapters",
                stored,
                filtered.kept.len()
            ),
        );
        ctx.progress
            .transition(document, DocumentStatus::ScenesDetected)
            .await?;

        info!(
            scenes = stored,
            chapters = document.total_chapters,
            skipped = filtered.skipped.len(),
            words = document.total_words,
            "Segmentation complete"
        );

        Ok(StageOutcome {
            items: stored,
            item_errors: 0,
            follow_up: ctx
                .config
                .analysis
                .auto_analyze
                .then_some(Stage::Analysis),
        })
    }
}
