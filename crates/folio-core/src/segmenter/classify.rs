//! Scene-type classification and per-paragraph signals.

use std::collections::HashSet;

use super::patterns::{
    is_name_stopword, ACTION_VERB_RE, CAPITALIZED_TOKEN_RE, DESCRIPTIVE_RE,
    LOCATION_TRANSITION_RE, NAME_BEFORE_VERB_RE, PRONOUN_RE, QUOTED_SPAN_RE, TIME_TRANSITION_RE,
    VERB_BEFORE_NAME_RE,
};
use crate::types::SceneType;

const DIALOGUE_RATIO: f32 = 0.3;
const ACTION_MIN_MATCHES: usize = 5;
const DESCRIPTION_MIN_MATCHES: usize = 10;
const DESCRIPTION_MAX_DIALOGUE: f32 = 0.1;
const MAX_ESTIMATED_CHARACTERS: usize = 10;

/// Fraction of characters inside quotation marks.
pub fn dialogue_ratio(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let quoted: usize = QUOTED_SPAN_RE
        .find_iter(text)
        .map(|m| m.as_str().chars().count())
        .sum();
    quoted as f32 / total as f32
}

/// Whether a paragraph contains dialogue: quotation marks, or a speech
/// verb next to a capitalized name.
pub fn has_dialogue(text: &str) -> bool {
    text.contains('"')
        || text.contains('“')
        || text.contains('”')
        || QUOTED_SPAN_RE.is_match(text)
        || infer_speaker(text).is_some()
}

/// Infer who is speaking.
///
/// Tries "Name said" before "said Name"; names made only of stopwords
/// (pronouns, sentence openers) are skipped.
pub fn infer_speaker(text: &str) -> Option<String> {
    for re in [&*NAME_BEFORE_VERB_RE, &*VERB_BEFORE_NAME_RE] {
        for captures in re.captures_iter(text) {
            let Some(raw) = captures.get(1) else {
                continue;
            };
            let name: Vec<&str> = raw
                .as_str()
                .split_whitespace()
                .filter(|token| !is_name_stopword(token))
                .collect();
            if !name.is_empty() {
                return Some(name.join(" "));
            }
        }
    }
    None
}

/// Classify a scene's text.
pub fn classify(text: &str) -> SceneType {
    let ratio = dialogue_ratio(text);
    if ratio > DIALOGUE_RATIO {
        return SceneType::Dialogue;
    }
    if ACTION_VERB_RE.find_iter(text).count() > ACTION_MIN_MATCHES {
        return SceneType::Action;
    }
    if DESCRIPTIVE_RE.find_iter(text).count() > DESCRIPTION_MIN_MATCHES
        && ratio < DESCRIPTION_MAX_DIALOGUE
    {
        return SceneType::Description;
    }
    let opening = text.trim_start();
    if TIME_TRANSITION_RE.is_match(opening) || LOCATION_TRANSITION_RE.is_match(opening) {
        return SceneType::Transition;
    }
    SceneType::Narrative
}

/// Estimate how many characters appear in a scene.
pub fn estimate_characters(text: &str, has_dialogue: bool) -> u8 {
    let names: HashSet<&str> = CAPITALIZED_TOKEN_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|token| !is_name_stopword(token))
        .collect();

    let mut estimate = names.len();
    if estimate == 0 && (has_dialogue || PRONOUN_RE.is_match(text)) {
        estimate = 1;
    }
    estimate.min(MAX_ESTIMATED_CHARACTERS) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_speaker_orders() {
        assert_eq!(
            infer_speaker("\"North,\" Jon Snow said quietly."),
            Some("Jon Snow".to_string())
        );
        assert_eq!(
            infer_speaker("\"South,\" said Sansa, frowning."),
            Some("Sansa".to_string())
        );
        assert_eq!(infer_speaker("\"Go,\" he said."), None);
        assert_eq!(infer_speaker("Then Arya said nothing."), Some("Arya".to_string()));
    }

    #[test]
    fn test_has_dialogue() {
        assert!(has_dialogue("“Wait,” he whispered."));
        assert!(has_dialogue("Tyrion asked for wine."));
        assert!(!has_dialogue("The snow fell over the yard."));
    }

    #[test]
    fn test_classify_dialogue() {
        let text = "\"Where are you going tonight?\" \"To the wall, where else would I go?\" he said.";
        assert_eq!(classify(text), SceneType::Dialogue);
    }

    #[test]
    fn test_classify_action() {
        let text = "He ran. He jumped the wall, grabbed the rope, swung across, kicked the guard and fled into the trees.";
        assert_eq!(classify(text), SceneType::Action);
    }

    #[test]
    fn test_classify_description() {
        let text = "The hall was vast and dark, its ancient stone walls pale with frost. \
                    Tall narrow windows of gilded glass glowed above the heavy wooden tables, \
                    and silver banners hung silent in the cold air.";
        assert_eq!(classify(text), SceneType::Description);
    }

    #[test]
    fn test_classify_transition_and_narrative() {
        assert_eq!(
            classify("Later that week, the ravens returned."),
            SceneType::Transition
        );
        assert_eq!(
            classify("Outside, the road wound north."),
            SceneType::Transition
        );
        assert_eq!(
            classify("She thought of home and of her father."),
            SceneType::Narrative
        );
    }

    #[test]
    fn test_estimate_characters() {
        assert_eq!(estimate_characters("Arya and Sansa met Ned's wolf.", false), 3);
        assert_eq!(estimate_characters("She waited.", false), 1);
        assert_eq!(estimate_characters("the wind howled.", false), 0);
        let crowd = "Aa Bb Cc Dd Ee Ff Gg Hh Ii Jj Kk Ll";
        assert_eq!(estimate_characters(crowd, false), 10);
    }
}
