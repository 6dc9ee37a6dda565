//! Settings derived from scene analyses.

use std::collections::HashMap;

use chrono::Utc;

use super::mention::normalize_name;
use crate::types::{AnalysisStatus, Scene, Setting};

const MAX_KEYWORDS: usize = 12;

/// Group completed scenes' setting strings case-insensitively.
///
/// The description is the first scene's mood and time of day; keywords are
/// the most frequent visual elements across the group.
pub fn derive_settings(document_id: &str, scenes: &[Scene]) -> Vec<Setting> {
    struct Acc {
        name: String,
        first_scene_index: u32,
        scene_count: u32,
        description: String,
        keywords: Vec<(String, usize)>,
    }

    let mut ordered: Vec<&Scene> = scenes
        .iter()
        .filter(|s| s.analysis_status == AnalysisStatus::Completed)
        .collect();
    ordered.sort_by_key(|s| s.global_index);

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Acc> = HashMap::new();

    for scene in ordered {
        let Some(analysis) = scene.analysis.as_ref().filter(|a| a.has_setting()) else {
            continue;
        };

        let key = normalize_name(&analysis.setting);
        let acc = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            let mut description = analysis.setting.clone();
            if let Some(time) = &analysis.time_of_day {
                description.push_str(&format!(", {}", time));
            }
            if !crate::json_parser::is_placeholder(&analysis.mood) {
                description.push_str(&format!("; mood: {}", analysis.mood));
            }
            Acc {
                name: analysis.setting.trim().to_string(),
                first_scene_index: scene.global_index,
                scene_count: 0,
                description,
                keywords: Vec::new(),
            }
        });

        acc.scene_count += 1;
        for element in &analysis.visual_elements {
            let element = element.trim().to_lowercase();
            match acc.keywords.iter_mut().find(|(k, _)| *k == element) {
                Some((_, count)) => *count += 1,
                None => acc.keywords.push((element, 1)),
            }
        }
    }

    let now = Utc::now();
    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|mut acc| {
            // stable sort keeps first-seen order among equal counts
            acc.keywords.sort_by(|a, b| b.1.cmp(&a.1));
            Setting {
                id: Setting::derive_id(document_id, &acc.name),
                document_id: document_id.to_string(),
                name: acc.name,
                description: acc.description,
                keywords: acc
                    .keywords
                    .into_iter()
                    .take(MAX_KEYWORDS)
                    .map(|(k, _)| k)
                    .collect(),
                scene_count: acc.scene_count,
                first_scene_index: acc.first_scene_index,
                created_at: now,
            }
        })
        .collect()
}
