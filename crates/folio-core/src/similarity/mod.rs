//! Embedding text construction and cosine ranking.

use sha2::{Digest, Sha256};

use crate::error::{FolioError, FolioResult};
use crate::json_parser::is_placeholder;
use crate::types::{Character, EmbeddingRecord, SimilarityMatch, SimilarityQuery, Setting};

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > f32::EPSILON && norm_b > f32::EPSILON {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Cosine distance in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Rank candidates against a query vector.
///
/// Candidates from another (provider, model) pair are skipped. A candidate
/// with a different dimensionality in the same space is an error.
pub fn rank_candidates(
    query_vector: &[f32],
    provider: &str,
    model: &str,
    candidates: impl Iterator<Item = EmbeddingRecord>,
    query: &SimilarityQuery,
) -> FolioResult<Vec<SimilarityMatch>> {
    let mut matches = Vec::new();

    for candidate in candidates {
        if candidate.provider != provider || candidate.model != model {
            tracing::debug!(
                entity_id = %candidate.entity_id,
                candidate_provider = %candidate.provider,
                candidate_model = %candidate.model,
                "Skipping embedding from a different provider/model"
            );
            continue;
        }
        if candidate.vector.len() != query_vector.len() {
            return Err(FolioError::dimension_mismatch(
                query_vector.len(),
                candidate.vector.len(),
            ));
        }

        let distance = cosine_distance(query_vector, &candidate.vector);
        let similarity = 1.0 - distance;
        if similarity < query.threshold {
            continue;
        }

        matches.push(SimilarityMatch {
            entity_id: candidate.entity_id,
            entity_kind: candidate.entity_kind,
            distance,
            similarity,
        });
    }

    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    matches.truncate(query.limit);
    Ok(matches)
}

/// Text embedded for a character.
///
/// Unknown attributes are left out so they do not pull unrelated
/// characters together.
pub fn character_embedding_text(character: &Character) -> String {
    let profile = &character.profile;
    let mut parts = vec![format!("Name: {}", character.name)];

    if !character.aliases.is_empty() {
        parts.push(format!("Also known as: {}", character.aliases.join(", ")));
    }
    parts.push(format!("Role: {}", character.role));

    if !is_placeholder(&profile.visual_summary) {
        parts.push(format!("Appearance: {}", profile.visual_summary));
    }
    if !is_placeholder(&profile.personality_summary) {
        parts.push(format!("Personality: {}", profile.personality_summary));
    }

    let attributes: Vec<String> = profile
        .key_attributes()
        .into_iter()
        .map(|(label, value)| format!("{}: {}", label, value))
        .collect();
    if !attributes.is_empty() {
        parts.push(format!("Attributes: {}", attributes.join("; ")));
    }

    let features: Vec<&str> = profile
        .distinctive_features
        .iter()
        .chain(profile.distinguishing_marks.iter())
        .map(String::as_str)
        .filter(|f| !is_placeholder(f))
        .collect();
    if !features.is_empty() {
        parts.push(format!("Distinctive features: {}", features.join(", ")));
    }

    parts.join("\n")
}

/// Text embedded for a setting.
pub fn setting_embedding_text(setting: &Setting) -> String {
    let mut parts = vec![format!("Setting: {}", setting.name)];
    if !is_placeholder(&setting.description) {
        parts.push(format!("Description: {}", setting.description));
    }
    if !setting.keywords.is_empty() {
        parts.push(format!("Keywords: {}", setting.keywords.join(", ")));
    }
    parts.join("\n")
}

/// Hash of an embedding text, used to skip re-embedding unchanged entities.
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
