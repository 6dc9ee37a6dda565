//! Structured scene analysis produced by the LLM.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FolioResult;
use crate::json_parser::{self, lenient_list, lenient_str, NOT_SPECIFIED};

/// A character as seen in one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSighting {
    pub name: String,
    pub description: String,
}

/// Structured analysis of one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub characters: Vec<CharacterSighting>,
    pub setting: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,
    pub mood: String,
    pub visual_elements: Vec<String>,
    pub key_actions: Vec<String>,
}

impl Default for SceneAnalysis {
    fn default() -> Self {
        Self {
            characters: Vec::new(),
            setting: NOT_SPECIFIED.to_string(),
            time_of_day: None,
            weather: None,
            mood: NOT_SPECIFIED.to_string(),
            visual_elements: Vec::new(),
            key_actions: Vec::new(),
        }
    }
}

impl SceneAnalysis {
    /// Parse a raw model response.
    ///
    /// Fails only when no JSON object can be recovered; every field is
    /// normalized independently.
    pub fn from_llm_response(raw: &str) -> FolioResult<Self> {
        let object = json_parser::parse_object(raw)?;
        Ok(Self::from_json(&Value::Object(object)))
    }

    /// Normalize an already-parsed JSON object.
    pub fn from_json(value: &Value) -> Self {
        let field = |camel: &str, snake: &str| value.get(snake).or_else(|| value.get(camel));

        Self {
            characters: parse_characters(value.get("characters")),
            setting: lenient_str(value.get("setting"))
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            time_of_day: lenient_str(field("timeOfDay", "time_of_day")),
            weather: lenient_str(value.get("weather")),
            mood: lenient_str(value.get("mood")).unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            visual_elements: lenient_list(field("visualElements", "visual_elements")),
            key_actions: lenient_list(field("keyActions", "key_actions")),
        }
    }

    /// Whether a setting was identified.
    pub fn has_setting(&self) -> bool {
        !json_parser::is_placeholder(&self.setting)
    }
}

fn parse_characters(value: Option<&Value>) -> Vec<CharacterSighting> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(_) => {
                let name = lenient_str(item.get("name"))?;
                let description = lenient_str(item.get("description"))
                    .or_else(|| lenient_str(item.get("appearance")))
                    .unwrap_or_else(|| NOT_SPECIFIED.to_string());
                Some(CharacterSighting { name, description })
            }
            Value::String(_) => lenient_str(Some(item)).map(|name| CharacterSighting {
                name,
                description: NOT_SPECIFIED.to_string(),
            }),
            _ => None,
        })
        .collect()
}
