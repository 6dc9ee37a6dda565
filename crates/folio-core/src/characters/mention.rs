//! Mentions and exact-name grouping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::json_parser::is_placeholder;
use crate::types::{AnalysisStatus, Scene};

/// One (scene, character-name, description) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterMention {
    pub scene_id: String,
    pub global_index: u32,
    pub chapter_index: u32,
    pub chapter_title: String,
    pub name: String,
    pub description: String,
}

impl CharacterMention {
    pub fn has_description(&self) -> bool {
        !is_placeholder(&self.description)
    }
}

/// Read mentions from every completed scene, in global-index order.
pub fn extract_mentions(scenes: &[Scene]) -> Vec<CharacterMention> {
    let mut ordered: Vec<&Scene> = scenes
        .iter()
        .filter(|s| s.analysis_status == AnalysisStatus::Completed)
        .collect();
    ordered.sort_by_key(|s| s.global_index);

    ordered
        .into_iter()
        .filter_map(|scene| scene.analysis.as_ref().map(|analysis| (scene, analysis)))
        .flat_map(|(scene, analysis)| {
            analysis.characters.iter().map(move |sighting| CharacterMention {
                scene_id: scene.id.clone(),
                global_index: scene.global_index,
                chapter_index: scene.chapter_index,
                chapter_title: scene.chapter_title.clone(),
                name: sighting.name.trim().to_string(),
                description: sighting.description.clone(),
            })
        })
        .filter(|m| !m.name.is_empty())
        .collect()
}

/// Case-insensitive, whitespace-collapsed form of a name.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Mentions believed to refer to one narrative identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterGroup {
    pub canonical_name: String,
    pub aliases: Vec<String>,
    /// Ordered by global index.
    pub mentions: Vec<CharacterMention>,
}

impl CharacterGroup {
    /// Canonical name followed by aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn first_mention(&self) -> Option<&CharacterMention> {
        self.mentions.first()
    }

    pub fn first_scene_index(&self) -> u32 {
        self.first_mention().map(|m| m.global_index).unwrap_or(0)
    }

    /// Number of distinct scenes the character appears in.
    pub fn scene_count(&self) -> usize {
        let mut scenes: Vec<&str> = self.mentions.iter().map(|m| m.scene_id.as_str()).collect();
        scenes.sort_unstable();
        scenes.dedup();
        scenes.len()
    }

    /// Up to `limit` informative descriptions, most detailed first, then
    /// returned in order of appearance.
    pub fn representative_mentions(&self, limit: usize) -> Vec<&CharacterMention> {
        let mut seen = Vec::<String>::new();
        let mut candidates: Vec<&CharacterMention> = Vec::new();
        for mention in self.mentions.iter().filter(|m| m.has_description()) {
            let key = mention.description.trim().to_lowercase();
            if !seen.contains(&key) {
                seen.push(key);
                candidates.push(mention);
            }
        }

        candidates.sort_by(|a, b| {
            b.description
                .len()
                .cmp(&a.description.len())
                .then(a.global_index.cmp(&b.global_index))
        });
        candidates.truncate(limit);
        candidates.sort_by_key(|m| m.global_index);
        candidates
    }

    /// Descriptions of the representative mentions, tagged with their chapter.
    pub fn representative_descriptions(&self, limit: usize) -> Vec<String> {
        self.representative_mentions(limit)
            .into_iter()
            .map(|m| format!("[{}] {}", m.chapter_title, m.description))
            .collect()
    }

    /// Fold another group into this one. Its names become aliases.
    pub fn absorb(&mut self, other: CharacterGroup) {
        let own = normalize_name(&self.canonical_name);
        for name in other.names() {
            let normalized = normalize_name(name);
            if normalized != own && !self.aliases.iter().any(|a| normalize_name(a) == normalized) {
                self.aliases.push(name.to_string());
            }
        }
        self.mentions.extend(other.mentions);
        self.mentions.sort_by_key(|m| m.global_index);
    }
}

/// Phase 1: group mentions by exact (case-insensitive) name.
///
/// The canonical spelling is the most frequent one, ties going to the
/// earliest. Groups come back ordered by first appearance.
pub fn group_exact(mentions: Vec<CharacterMention>) -> Vec<CharacterGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<CharacterMention>> = HashMap::new();

    for mention in mentions {
        let key = normalize_name(&mention.name);
        if !buckets.contains_key(&key) {
            order.push(key.clone());
        }
        buckets.entry(key).or_default().push(mention);
    }

    let mut groups: Vec<CharacterGroup> = order
        .into_iter()
        .filter_map(|key| buckets.remove(&key))
        .map(|mut mentions| {
            mentions.sort_by_key(|m| m.global_index);
            CharacterGroup {
                canonical_name: preferred_spelling(&mentions),
                aliases: Vec::new(),
                mentions,
            }
        })
        .collect();

    groups.sort_by_key(|g| g.first_scene_index());
    groups
}

fn preferred_spelling(mentions: &[CharacterMention]) -> String {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for mention in mentions {
        let spelling = mention.name.split_whitespace().collect::<Vec<_>>().join(" ");
        match counts.iter_mut().find(|(s, _)| *s == spelling) {
            Some((_, count)) => *count += 1,
            None => counts.push((spelling, 1)),
        }
    }

    let best = counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
    counts
        .into_iter()
        .find(|(_, count)| *count == best)
        .map(|(spelling, _)| spelling)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(scene: u32, name: &str, description: &str) -> CharacterMention {
        CharacterMention {
            scene_id: format!("scene-{}", scene),
            global_index: scene,
            chapter_index: 0,
            chapter_title: "Chapter 1".to_string(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_group_exact_is_case_insensitive() {
        let groups = group_exact(vec![
            mention(0, "Arya", "small girl"),
            mention(1, "Jon", "dark-haired"),
            mention(2, "ARYA", "thin, grey eyes"),
            mention(3, "arya", "muddy"),
            mention(4, "Arya", "quick"),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].canonical_name, "Arya");
        assert_eq!(groups[0].mentions.len(), 4);
        assert_eq!(groups[1].canonical_name, "Jon");
        assert!(groups[0].aliases.is_empty());
    }

    #[test]
    fn test_canonical_spelling_tie_goes_to_earliest() {
        let groups = group_exact(vec![mention(0, "Jon snow", "a"), mention(1, "Jon Snow", "b")]);
        assert_eq!(groups[0].canonical_name, "Jon snow");
    }

    #[test]
    fn test_absorb_adds_aliases_and_orders_mentions() {
        let mut jon = CharacterGroup {
            canonical_name: "Jon".to_string(),
            aliases: vec![],
            mentions: vec![mention(0, "Jon", "a"), mention(5, "Jon", "b")],
        };
        let snow = CharacterGroup {
            canonical_name: "Jon Snow".to_string(),
            aliases: vec!["Lord Snow".to_string(), "jon".to_string()],
            mentions: vec![mention(2, "Jon Snow", "c")],
        };

        jon.absorb(snow);
        assert_eq!(jon.aliases, vec!["Jon Snow", "Lord Snow"]);
        let order: Vec<u32> = jon.mentions.iter().map(|m| m.global_index).collect();
        assert_eq!(order, vec![0, 2, 5]);
        assert_eq!(jon.scene_count(), 3);
    }

    #[test]
    fn test_representative_mentions() {
        let group = CharacterGroup {
            canonical_name: "Ned".to_string(),
            aliases: vec![],
            mentions: vec![
                mention(0, "Ned", "grave"),
                mention(1, "Ned", "not specified"),
                mention(2, "Ned", "a grave, bearded lord in grey wool"),
                mention(3, "Ned", "Grave"),
                mention(4, "Ned", "tired eyes"),
            ],
        };

        let picked = group.representative_mentions(2);
        let indices: Vec<u32> = picked.iter().map(|m| m.global_index).collect();
        assert_eq!(indices, vec![2, 4]);
    }
}
