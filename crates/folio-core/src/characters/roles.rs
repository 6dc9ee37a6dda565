//! Role classification from appearance frequency.

use crate::config::RoleThresholds;
use crate::types::CharacterRole;

/// Classify by the share of scenes a character appears in.
pub fn classify_role(scene_count: usize, total_scenes: usize, thresholds: &RoleThresholds) -> CharacterRole {
    if total_scenes == 0 {
        return CharacterRole::Background;
    }

    let ratio = scene_count as f32 / total_scenes as f32;
    if ratio >= thresholds.protagonist {
        CharacterRole::Protagonist
    } else if ratio >= thresholds.supporting {
        CharacterRole::Supporting
    } else if ratio >= thresholds.minor {
        CharacterRole::Minor
    } else {
        CharacterRole::Background
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_cutoffs() {
        let t = RoleThresholds::default();
        assert_eq!(classify_role(40, 100, &t), CharacterRole::Protagonist);
        assert_eq!(classify_role(39, 100, &t), CharacterRole::Supporting);
        assert_eq!(classify_role(20, 100, &t), CharacterRole::Supporting);
        assert_eq!(classify_role(5, 100, &t), CharacterRole::Minor);
        assert_eq!(classify_role(4, 100, &t), CharacterRole::Background);
        assert_eq!(classify_role(0, 0, &t), CharacterRole::Background);
    }
}
