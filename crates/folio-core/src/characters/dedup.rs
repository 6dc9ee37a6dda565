//! Phase 2 character deduplication.
//!
//! Exact-name groups are compared pairwise in index order. A cheap name
//! pre-filter skips pairs that cannot plausibly match; surviving pairs go to
//! the LLM, and a group absorbs a later one only on a confident "same"
//! verdict.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::mention::{normalize_name, CharacterGroup};
use crate::config::DedupConfig;
use crate::error::FolioResult;
use crate::json_parser::{self, lenient_bool, lenient_f32, lenient_str};
use crate::prompts;
use crate::traits::{GenerationOptions, Llm};

/// LLM answer to "are these the same character?".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeVerdict {
    pub same: bool,
    pub confidence: f32,
    pub reasoning: String,
}

impl MergeVerdict {
    /// Parse leniently; a missing verdict reads as "not the same".
    pub fn from_llm_response(raw: &str) -> FolioResult<Self> {
        let object = json_parser::parse_object(raw)?;
        let value = Value::Object(object);
        Ok(Self {
            same: lenient_bool(value.get("same")).unwrap_or(false),
            confidence: lenient_f32(value.get("confidence"))
                .unwrap_or(0.0)
                .clamp(0.0, 1.0),
            reasoning: lenient_str(value.get("reasoning")).unwrap_or_default(),
        })
    }
}

/// A merge that happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRecord {
    pub kept: String,
    pub absorbed: String,
    pub confidence: f32,
    pub reasoning: String,
}

/// A pair the LLM was unsure about. Kept apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmbiguousPair {
    pub first: String,
    pub second: String,
    pub confidence: f32,
    pub reasoning: String,
}

/// Result of a deduplication pass.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub groups: Vec<CharacterGroup>,
    pub merges: Vec<MergeRecord>,
    pub ambiguous: Vec<AmbiguousPair>,
    pub llm_calls: usize,
    pub skipped_by_prefilter: usize,
    /// Comparisons whose response could not be used.
    pub failed_comparisons: usize,
}

fn name_tokens(name: &str) -> HashSet<String> {
    normalize_name(name)
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Name similarity in `[0, 1]`.
///
/// 1.0 when every token of one name appears in the other ("Jon" / "Jon
/// Snow"); otherwise shared tokens over the larger token count.
pub fn name_similarity(a: &str, b: &str) -> f32 {
    let ta = name_tokens(a);
    let tb = name_tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    if ta.is_subset(&tb) || tb.is_subset(&ta) {
        return 1.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f32 / ta.len().max(tb.len()) as f32
}

/// Best name similarity over every name of both groups.
pub fn group_name_similarity(a: &CharacterGroup, b: &CharacterGroup) -> f32 {
    a.names()
        .flat_map(|na| b.names().map(move |nb| name_similarity(na, nb)))
        .fold(0.0, f32::max)
}

/// LLM-assisted deduplicator.
pub struct CharacterDeduplicator {
    llm: Arc<dyn Llm>,
    config: DedupConfig,
}

impl CharacterDeduplicator {
    pub fn new(llm: Arc<dyn Llm>, config: DedupConfig) -> Self {
        Self { llm, config }
    }

    /// Ask the LLM whether two groups are one identity.
    pub async fn compare(
        &self,
        a: &CharacterGroup,
        b: &CharacterGroup,
    ) -> FolioResult<MergeVerdict> {
        let limit = self.config.max_mentions_per_side;
        let prompt = prompts::character_comparison_prompt(
            &a.canonical_name,
            &a.representative_descriptions(limit),
            &b.canonical_name,
            &b.representative_descriptions(limit),
        );
        let options = GenerationOptions::json()
            .with_temperature(0.1)
            .with_max_tokens(300);

        let raw = self.llm.generate(&prompt, &options).await?;
        MergeVerdict::from_llm_response(&raw)
    }

    /// Run Phase 2 over exact-name groups ordered by first appearance.
    ///
    /// Item-level failures (an unparseable verdict) count as "not the same";
    /// credential, rate-limit and connectivity errors propagate so the stage
    /// can retry.
    pub async fn deduplicate(&self, groups: Vec<CharacterGroup>) -> FolioResult<DedupOutcome> {
        let mut slots: Vec<Option<CharacterGroup>> = groups.into_iter().map(Some).collect();
        let mut outcome = DedupOutcome::default();

        for i in 0..slots.len() {
            if slots[i].is_none() {
                continue;
            }
            for j in (i + 1)..slots.len() {
                let (Some(left), Some(right)) = (slots[i].as_ref(), slots[j].as_ref()) else {
                    continue;
                };

                let similarity = group_name_similarity(left, right);
                if similarity < self.config.name_similarity_threshold {
                    outcome.skipped_by_prefilter += 1;
                    continue;
                }

                outcome.llm_calls += 1;
                let verdict = match self.compare(left, right).await {
                    Ok(verdict) => verdict,
                    Err(e) if e.is_item_level() => {
                        warn!(
                            first = %left.canonical_name,
                            second = %right.canonical_name,
                            error = %e,
                            "Character comparison failed, keeping both"
                        );
                        outcome.failed_comparisons += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if verdict.same && verdict.confidence > self.config.confidence_threshold {
                    debug!(
                        kept = %left.canonical_name,
                        absorbed = %right.canonical_name,
                        confidence = verdict.confidence,
                        "Merging character groups"
                    );
                    outcome.merges.push(MergeRecord {
                        kept: left.canonical_name.clone(),
                        absorbed: right.canonical_name.clone(),
                        confidence: verdict.confidence,
                        reasoning: verdict.reasoning,
                    });
                    if let Some(absorbed) = slots[j].take() {
                        if let Some(kept) = slots[i].as_mut() {
                            kept.absorb(absorbed);
                        }
                    }
                } else if verdict.confidence >= self.config.ambiguous_floor
                    && verdict.confidence <= self.config.confidence_threshold
                {
                    info!(
                        first = %left.canonical_name,
                        second = %right.canonical_name,
                        confidence = verdict.confidence,
                        reasoning = %verdict.reasoning,
                        "Ambiguous character match left unmerged"
                    );
                    outcome.ambiguous.push(AmbiguousPair {
                        first: left.canonical_name.clone(),
                        second: right.canonical_name.clone(),
                        confidence: verdict.confidence,
                        reasoning: verdict.reasoning,
                    });
                }
            }
        }

        outcome.groups = slots.into_iter().flatten().collect();
        info!(
            groups = outcome.groups.len(),
            merges = outcome.merges.len(),
            ambiguous = outcome.ambiguous.len(),
            llm_calls = outcome.llm_calls,
            skipped = outcome.skipped_by_prefilter,
            "Character deduplication finished"
        );
        Ok(outcome)
    }
}
