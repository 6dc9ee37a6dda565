//! Stage 3: character discovery, profile synthesis and embeddings.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::progress::Milestones;
use super::stage::{StageContext, StageHandler, StageOutcome};
use crate::characters::{
    classify_role, derive_settings, extract_mentions, group_exact, CharacterDeduplicator,
    CharacterGroup, ProfileSynthesizer, SynthesizedProfile,
};
use crate::error::{FolioError, FolioResult};
use crate::similarity::{character_embedding_text, setting_embedding_text, text_hash};
use crate::traits::{ensure_dimensions, Embedder};
use crate::types::{
    Character, Document, DocumentStatus, EmbeddingRecord, EntityKind, Stage, StagePayload,
};

/// Texts sent to the embedder per call.
const EMBED_CHUNK: usize = 32;

/// Turns completed scene analyses into deduplicated characters with
/// profiles, plus recurring settings, and indexes both for similarity.
#[derive(Debug, Default)]
pub struct DiscoveryStage;

#[async_trait]
impl StageHandler for DiscoveryStage {
    fn stage(&self) -> Stage {
        Stage::Discovery
    }

    #[instrument(skip_all, fields(document_id = %document.id, stage = "discovery"))]
    async fn execute(
        &self,
        ctx: &StageContext,
        document: &mut Document,
        payload: &StagePayload,
    ) -> FolioResult<StageOutcome> {
        let stage = Stage::Discovery;
        let llm = ctx.llm(payload).await?;
        // resolved up front so a missing key fails before any LLM spend
        let embedder = ctx.embedder(payload).await?;

        let scenes = ctx.store.list_scenes(&document.id).await?;
        let total_scenes = scenes.len();

        ctx.progress
            .report(document, stage, 0.0, "Collecting character mentions")
            .await?;
        let mentions = extract_mentions(&scenes);
        let groups = group_exact(mentions);
        debug!(groups = groups.len(), "Exact-name groups");

        ctx.progress
            .report(
                document,
                stage,
                0.1,
                format!("Deduplicating {} character names", groups.len()),
            )
            .await?;
        let dedup = CharacterDeduplicator::new(llm.clone(), ctx.config.dedup.clone())
            .deduplicate(groups)
            .await?;
        let groups = dedup.groups;

        let mut item_errors = dedup.failed_comparisons;
        let mut characters = Vec::with_capacity(groups.len());

        if !groups.is_empty() {
            document.set_progress(
                stage.overall_progress(0.3),
                format!("Building {} character profiles", groups.len()),
            );
            ctx.progress
                .transition(document, DocumentStatus::BuildingCharacterProfiles)
                .await?;

            let synthesizer = ProfileSynthesizer::new(llm, ctx.config.synthesis.clone());
            let milestones = Milestones::new(groups.len(), 10);
            for (i, group) in groups.iter().enumerate() {
                let synthesized = synthesizer.synthesize(group).await?;
                if synthesized.error.is_some() {
                    item_errors += 1;
                }
                characters.push(build_character(&document.id, group, synthesized, total_scenes, ctx));

                let done = i + 1;
                if milestones.hit(done, groups.len()) {
                    ctx.progress
                        .report(
                            document,
                            stage,
                            0.3 + 0.5 * done as f32 / groups.len() as f32,
                            format!("Built {} of {} character profiles", done, groups.len()),
                        )
                        .await?;
                }
            }
        }

        let stored = ctx
            .store
            .replace_characters(&document.id, characters.clone())
            .await?;
        let settings = derive_settings(&document.id, &scenes);
        ctx.store
            .replace_settings(&document.id, settings.clone())
            .await?;

        ctx.progress
            .report(document, stage, 0.85, "Indexing characters and settings")
            .await?;
        let mut entries: Vec<(String, EntityKind, String)> = characters
            .iter()
            .map(|c| (c.id.clone(), EntityKind::Character, character_embedding_text(c)))
            .collect();
        entries.extend(
            settings
                .iter()
                .map(|s| (s.id.clone(), EntityKind::Setting, setting_embedding_text(s))),
        );
        item_errors += index_entities(ctx, embedder.as_ref(), &document.id, entries).await?;

        let character_ids: Vec<String> = characters.iter().map(|c| c.id.clone()).collect();
        let setting_ids: Vec<String> = settings.iter().map(|s| s.id.clone()).collect();
        let removed = ctx
            .index
            .retain_embeddings(&document.id, EntityKind::Character, &character_ids)
            .await?
            + ctx
                .index
                .retain_embeddings(&document.id, EntityKind::Setting, &setting_ids)
                .await?;
        if removed > 0 {
            debug!(removed, "Dropped embeddings of vanished entities");
        }

        document.total_characters = stored as u32;
        document.error_message = (item_errors > 0)
            .then(|| format!("{} item(s) failed during character discovery", item_errors));
        let step = if item_errors > 0 {
            format!(
                "Discovered {} characters and {} settings with {} error(s)",
                stored,
                settings.len(),
                item_errors
            )
        } else {
            format!("Discovered {} characters and {} settings", stored, settings.len())
        };
        document.set_progress(stage.overall_progress(1.0), step);
        ctx.progress
            .transition(document, DocumentStatus::CharactersDiscovered)
            .await?;

        info!(
            characters = stored,
            settings = settings.len(),
            merges = dedup.merges.len(),
            ambiguous = dedup.ambiguous.len(),
            llm_calls = dedup.llm_calls,
            item_errors,
            "Character discovery complete"
        );

        Ok(StageOutcome {
            items: stored,
            item_errors,
            follow_up: None,
        })
    }
}

fn build_character(
    document_id: &str,
    group: &CharacterGroup,
    synthesized: SynthesizedProfile,
    total_scenes: usize,
    ctx: &StageContext,
) -> Character {
    let scene_count = group.scene_count();
    let now = Utc::now();
    Character {
        id: Character::derive_id(document_id, &group.canonical_name),
        document_id: document_id.to_string(),
        name: group.canonical_name.clone(),
        aliases: group.aliases.clone(),
        role: classify_role(scene_count, total_scenes, &ctx.config.roles),
        profile: synthesized.profile,
        profile_source: synthesized.source,
        synthesis_error: synthesized.error,
        first_scene_id: group.first_mention().map(|m| m.scene_id.clone()),
        first_scene_index: group.first_scene_index(),
        mention_count: group.mentions.len() as u32,
        scene_count: scene_count as u32,
        created_at: now,
        updated_at: now,
    }
}

/// Embed entities whose text changed since their last embedding.
///
/// Returns how many entities were left unindexed by item-level failures.
/// Provider failures (credentials, throttling, outages) abort the stage so
/// the job's retry policy applies.
async fn index_entities(
    ctx: &StageContext,
    embedder: &dyn Embedder,
    document_id: &str,
    entries: Vec<(String, EntityKind, String)>,
) -> FolioResult<usize> {
    if entries.is_empty() {
        return Ok(0);
    }

    let existing: HashMap<String, EmbeddingRecord> = ctx
        .index
        .list_embeddings(document_id, None)
        .await?
        .into_iter()
        .map(|r| (r.entity_id.clone(), r))
        .collect();

    let pending: Vec<(String, EntityKind, String, String)> = entries
        .into_iter()
        .filter_map(|(id, kind, text)| {
            let hash = text_hash(&text);
            let unchanged = existing.get(&id).is_some_and(|r| {
                r.text_hash == hash
                    && r.provider == embedder.provider_name()
                    && r.model == embedder.model_name()
            });
            (!unchanged).then_some((id, kind, text, hash))
        })
        .collect();
    debug!(to_embed = pending.len(), cached = existing.len(), "Embedding entities");

    let mut failures = 0;
    for chunk in pending.chunks(EMBED_CHUNK) {
        let texts: Vec<String> = chunk.iter().map(|(_, _, text, _)| text.clone()).collect();
        let vectors = match embedder.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(e) if e.is_item_level() => {
                warn!(error = %e, count = chunk.len(), "Embedding batch rejected");
                failures += chunk.len();
                continue;
            }
            Err(e) => return Err(e),
        };
        if vectors.len() != texts.len() {
            return Err(FolioError::embedding(format!(
                "Embedder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }

        let now = Utc::now();
        for ((id, kind, _, hash), vector) in chunk.iter().zip(vectors) {
            if let Err(e) = ensure_dimensions(&vector, embedder.dimensions()) {
                warn!(entity_id = %id, error = %e, "Discarding embedding");
                failures += 1;
                continue;
            }
            ctx.index
                .upsert_embedding(EmbeddingRecord {
                    entity_id: id.clone(),
                    entity_kind: *kind,
                    document_id: document_id.to_string(),
                    provider: embedder.provider_name().to_string(),
                    model: embedder.model_name().to_string(),
                    vector,
                    text_hash: hash.clone(),
                    updated_at: now,
                })
                .await?;
        }
    }
    Ok(failures)
}
