//! Prompt templates for scene analysis, character comparison and profile synthesis.

/// Longest scene excerpt sent for analysis, in characters.
pub const MAX_SCENE_CHARS: usize = 12_000;

const SCENE_SCHEMA: &str = r#"{
  "characters": [{"name": "full name as written", "description": "physical appearance, clothing and demeanour shown in this scene"}],
  "setting": "where the scene takes place",
  "timeOfDay": "dawn | morning | afternoon | evening | night | null",
  "weather": "weather conditions or null",
  "mood": "dominant emotional tone",
  "visualElements": ["notable objects, colours, lighting"],
  "keyActions": ["main things that happen"]
}"#;

/// Default scene-analysis prompt.
pub fn scene_analysis_prompt(scene_text: &str, chapter_title: Option<&str>) -> String {
    let chapter = chapter_title
        .map(|t| format!("Chapter: {}\n\n", t))
        .unwrap_or_default();

    format!(
        r#"You are analysing a scene from a novel to support illustration.

{chapter}Scene:
"""
{scene}
"""

Identify every character who is present or speaking. Use the name exactly as the text gives it; if a character is only described ("the old woman"), use that description as the name. Describe only what the text supports. Use null for time of day or weather when the text does not say.

Return a JSON object with this structure:
{schema}"#,
        chapter = chapter,
        scene = truncate_chars(scene_text, MAX_SCENE_CHARS),
        schema = SCENE_SCHEMA,
    )
}

/// Shorter scene-analysis prompt for small local models, which follow a
/// terse instruction and a flat schema more reliably.
pub fn compact_scene_analysis_prompt(scene_text: &str, chapter_title: Option<&str>) -> String {
    let chapter = chapter_title.unwrap_or("unknown");
    format!(
        r#"Read this scene (chapter: {chapter}) and answer in JSON only.

{scene}

JSON keys: characters (list of {{"name","description"}}), setting, timeOfDay, weather, mood, visualElements (list), keyActions (list). Use null when unknown."#,
        chapter = chapter,
        scene = truncate_chars(scene_text, MAX_SCENE_CHARS / 2),
    )
}

/// Ask whether two character groups are one narrative identity.
pub fn character_comparison_prompt(
    name_a: &str,
    mentions_a: &[String],
    name_b: &str,
    mentions_b: &[String],
) -> String {
    format!(
        r#"Two names were extracted from the same novel. Decide whether they refer to the same character.

Character A: "{name_a}"
Descriptions of A:
{mentions_a}

Character B: "{name_b}"
Descriptions of B:
{mentions_b}

Consider nicknames, titles, surnames and partial names, but different people can share a surname or title. Only answer "same": true if the descriptions are consistent.

Return a JSON object:
{{"same": true or false, "confidence": number between 0 and 1, "reasoning": "one sentence"}}"#,
        name_a = name_a,
        mentions_a = bullet_list(mentions_a),
        name_b = name_b,
        mentions_b = bullet_list(mentions_b),
    )
}

const PROFILE_SCHEMA: &str = r#"{
  "build": {"height": "", "body_type": "", "weight": ""},
  "face": {"face_shape": "", "eye_color": "", "eye_shape": "", "nose": "", "mouth": "", "facial_hair": ""},
  "hair": {"color": "", "length": "", "style": "", "texture": ""},
  "skin": {"tone": "", "complexion": "", "ethnicity": ""},
  "age": {"apparent_age": "", "age_range": ""},
  "distinguishing_marks": ["scars, tattoos, birthmarks"],
  "clothing": {"typical_attire": "", "colors": "", "accessories": "", "style": ""},
  "posture": {"posture": "", "gait": "", "mannerisms": ""},
  "voice": {"tone": "", "accent": "", "speech_pattern": ""},
  "distinctive_features": ["anything that makes the character instantly recognisable"],
  "visual_summary": "two or three sentences describing how the character looks",
  "personality_summary": "two or three sentences describing how the character behaves"
}"#;

/// Merge all mentions of one character into a single visual profile.
pub fn profile_synthesis_prompt(name: &str, aliases: &[String], mentions: &[String]) -> String {
    let aliases = if aliases.is_empty() {
        "none".to_string()
    } else {
        aliases.join(", ")
    };

    format!(
        r#"Build a consistent visual profile for a character in a novel from the descriptions below, gathered across several scenes.

Name: {name}
Also known as: {aliases}

Descriptions, in order of appearance:
{mentions}

Combine the details into one coherent description. When descriptions conflict, prefer the most specific one. Write "not specified" for any attribute the text does not establish; do not invent details. Both summaries are required.

Return a JSON object with exactly this structure:
{schema}"#,
        name = name,
        aliases = aliases,
        mentions = bullet_list(mentions),
        schema = PROFILE_SCHEMA,
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (no description)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
