//! Regex families and word lists used by the segmenter.

use once_cell::sync::Lazy;
use regex::Regex;

const SPEECH_VERBS: &str = "said|says|asked|asks|replied|answered|whispered|shouted|yelled|cried|muttered|murmured|called|exclaimed|snapped|growled|demanded|added|continued|responded|admitted|insisted|laughed|sighed|hissed|breathed|screamed|declared|announced|repeated|protested|pleaded|warned|agreed|stammered|mumbled";

/// Paragraph boundaries: one or more blank lines.
pub static PARAGRAPH_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*\n").expect("static regex"));

/// Scene-break markers: a paragraph made only of `*`, `-`, `_`, `#`, `~`
/// or bullet glyphs.
pub static BREAK_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s*\-_#~•·◦●○◆◇=]+$").expect("static regex"));

/// A quoted span in straight or curly double quotes, or curly single quotes.
pub static QUOTED_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]+"|“[^”]+”|‘[^’]+’"#).expect("static regex"));

/// Capitalized one-or-two-word name followed by a speech verb ("Arya said").
pub static NAME_BEFORE_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\s+(?:{})\b",
        SPEECH_VERBS
    ))
    .expect("static regex")
});

/// Speech verb followed by a capitalized one-or-two-word name ("said Arya").
pub static VERB_BEFORE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:{})\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\b",
        SPEECH_VERBS
    ))
    .expect("static regex")
});

pub static ACTION_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:ran|run|runs|running|jumped|leapt|leaped|grabbed|seized|struck|strikes|hit|punched|kicked|fought|slashed|swung|dodged|lunged|fired|shot|threw|hurled|pushed|shoved|pulled|charged|chased|fled|attacked|stabbed|rushed|sprinted|ducked|rolled|crashed|slammed|smashed|tackled|raced|climbed|dove|dived|blocked|parried|scrambled|twisted|yanked|sprang|stumbled|collapsed)\b",
    )
    .expect("static regex")
});

pub static DESCRIPTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:looked|seemed|appeared|gleamed|glittered|shimmered|glowed|loomed|stretched|towered|dark|bright|pale|golden|silver|ancient|vast|tall|narrow|wide|deep|cold|warm|soft|rough|smooth|crimson|scarlet|grey|gray|green|blue|black|white|red|shadowed|shadowy|misty|dim|faded|worn|tattered|elegant|ornate|gilded|velvet|wooden|heavy|thick|thin|silent|beautiful|enormous|tiny|massive|gnarled|weathered|sprawling|glistening)\b",
    )
    .expect("static regex")
});

/// Scenes opening with a time jump.
pub static TIME_TRANSITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:Later|Meanwhile|Afterwards?|Hours later|Days later|Weeks later|Months later|Years later|Moments later|Minutes later|The next (?:morning|day|evening|night|week)|The following (?:morning|day|evening|night|week)|That (?:night|evening|afternoon|morning)|By (?:nightfall|dawn|morning|evening|noon|midday)|When (?:morning|night|dawn|evening) came|Eventually|Soon after)\b",
    )
    .expect("static regex")
});

/// Scenes opening with a change of place.
pub static LOCATION_TRANSITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:At the|Outside|Inside|Back at|Back in|Elsewhere|Across the|Far away|Beyond the|Miles away|On the other side)\b",
    )
    .expect("static regex")
});

/// Capitalized tokens, with an optional possessive.
pub static CAPITALIZED_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+)(?:'s|’s)?\b").expect("static regex"));

pub static PRONOUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:he|she|him|her|his|hers|they|them|their)\b").expect("static regex")
});

/// Capitalized words that are not names: pronouns, determiners, common
/// sentence openers, titles, days and months.
pub const NAME_STOPWORDS: &[&str] = &[
    "I", "He", "She", "It", "We", "You", "They", "Him", "Her", "His", "Hers", "Its", "Our",
    "Your", "Their", "Them", "Me", "My", "Mine", "Us", "The", "A", "An", "This", "That",
    "These", "Those", "There", "Here", "Then", "Now", "When", "Where", "What", "Who", "Why",
    "How", "Which", "While", "If", "But", "And", "Or", "So", "Yet", "For", "Nor", "As", "At",
    "In", "On", "Of", "To", "By", "With", "From", "Into", "After", "Before", "Once", "Still",
    "Just", "Even", "Only", "Not", "No", "Yes", "Oh", "Ah", "Well", "Perhaps", "Maybe",
    "Later", "Meanwhile", "Outside", "Inside", "Back", "Elsewhere", "Soon", "Suddenly",
    "Finally", "Again", "Some", "All", "Every", "Each", "Both", "Nothing", "Something",
    "Everything", "Anything", "Someone", "Everyone", "Nobody", "Chapter", "Part", "Mr",
    "Mrs", "Ms", "Miss", "Dr", "Sir", "Lady", "Lord", "Monday", "Tuesday", "Wednesday",
    "Thursday", "Friday", "Saturday", "Sunday", "January", "February", "March", "April",
    "May", "June", "July", "August", "September", "October", "November", "December",
    "Did", "Do", "Does", "Was", "Were", "Is", "Are", "Had", "Has", "Have", "Will", "Would",
    "Could", "Should", "Can", "Let", "Don", "Didn", "Wasn", "Isn", "Come", "Go", "Look",
    "Please", "Thank", "Good", "Very", "Too", "Never", "Always", "Because", "Though",
    "Although", "Until", "Without", "Through", "Over", "Under", "Above", "Behind",
];

pub fn is_name_stopword(token: &str) -> bool {
    NAME_STOPWORDS.contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_markers() {
        for marker in ["***", "* * *", "---", "___", "###", "~~~", "• • •", "#"] {
            assert!(BREAK_MARKER_RE.is_match(marker), "{marker}");
        }
        assert!(!BREAK_MARKER_RE.is_match("- said nobody"));
        assert!(!BREAK_MARKER_RE.is_match("Three stars: ***"));
    }

    #[test]
    fn test_quoted_spans() {
        let text = "“Run,” she said. \"Now!\" ‘Why?’";
        assert_eq!(QUOTED_SPAN_RE.find_iter(text).count(), 3);
    }

    #[test]
    fn test_transition_openers() {
        assert!(TIME_TRANSITION_RE.is_match("The next morning the snow had stopped."));
        assert!(LOCATION_TRANSITION_RE.is_match("At the gate, a rider waited."));
        assert!(!TIME_TRANSITION_RE.is_match("She thought about it later."));
    }
}
