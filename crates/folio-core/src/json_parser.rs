//! JSON parsing utilities for LLM responses.
//!
//! Models wrap JSON in code fences, prepend chatter or emit `<think>` blocks.
//! Everything here is lenient about that framing and strict about the
//! payload itself: if no JSON object can be parsed the caller gets a
//! `Parse` error, which the pipeline treats as a per-item failure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ErrorCode, FolioError, FolioResult};

/// Sentinel for attributes the text does not establish.
pub const NOT_SPECIFIED: &str = "not specified";

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").expect("static regex"));

static FENCED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[a-zA-Z0-9]*\n?([\s\S]*?)\n?```$").expect("static regex"));

static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("static regex"));

/// Extract JSON from potentially wrapped response (code blocks, leading prose).
pub fn extract_json(text: &str) -> String {
    let text = text.trim();

    // Try to extract from code block
    if let Some(content) = CODE_BLOCK_RE.captures(text).and_then(|c| c.get(1)) {
        return content.as_str().trim().to_string();
    }

    // Fall back to the outermost object
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

/// Remove code blocks and thinking tags from response.
pub fn remove_code_blocks(content: &str) -> String {
    let content = THINK_RE.replace_all(content.trim(), "");
    let content = content.trim();

    FENCED_RE
        .captures(content)
        .and_then(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .unwrap_or_else(|| content.to_string())
}

/// Parse an LLM response into a JSON object.
pub fn parse_object(response: &str) -> FolioResult<serde_json::Map<String, Value>> {
    let cleaned = remove_code_blocks(response);
    if cleaned.is_empty() {
        return Err(FolioError::Parse {
            message: "Empty response from model".to_string(),
            code: ErrorCode::ParseInvalidJson,
        });
    }

    let json_str = extract_json(&cleaned);
    match serde_json::from_str::<Value>(&json_str) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FolioError::Parse {
            message: format!("Expected a JSON object, got {}", type_name(&other)),
            code: ErrorCode::ParseInvalidJson,
        }),
        Err(e) => Err(FolioError::Parse {
            message: format!("Failed to parse JSON: {}", e),
            code: ErrorCode::ParseInvalidJson,
        }),
    }
}

/// Parse an LLM response into a typed value.
pub fn parse_typed<T: DeserializeOwned>(response: &str) -> FolioResult<T> {
    let map = parse_object(response)?;
    serde_json::from_value(Value::Object(map)).map_err(|e| FolioError::Parse {
        message: format!("Unexpected JSON shape: {}", e),
        code: ErrorCode::ParseMissingField,
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read a value as a trimmed, non-empty string.
///
/// Numbers are stringified and string arrays joined; null, empty and
/// placeholder values such as "unknown" come back as `None`.
pub fn lenient_str(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| lenient_str(Some(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null | Value::Object(_) => return None,
    };

    if is_placeholder(&text) {
        None
    } else {
        Some(text)
    }
}

/// Read a value as a list of non-empty strings. A lone string becomes a
/// one-element list.
pub fn lenient_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| lenient_str(Some(v)))
            .collect(),
        Some(other) => lenient_str(Some(other)).into_iter().collect(),
        None => Vec::new(),
    }
}

/// Read a value as a float, accepting numeric strings.
pub fn lenient_f32(value: Option<&Value>) -> Option<f32> {
    match value? {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a value as a boolean, accepting "yes"/"true" strings.
pub fn lenient_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Whether a model-supplied string carries no information.
pub fn is_placeholder(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.is_empty()
        || matches!(
            lower.as_str(),
            "null" | "none" | "n/a" | "na" | "unknown" | "unspecified" | NOT_SPECIFIED | "-"
        )
}

/// Serde helpers that default missing or placeholder fields to the
/// "not specified" sentinel instead of failing the whole record.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::NOT_SPECIFIED;

    pub fn not_specified() -> String {
        NOT_SPECIFIED.to_string()
    }

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(super::lenient_str(Some(&value)).unwrap_or_else(not_specified))
    }

    pub fn list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(super::lenient_list(Some(&value)))
    }

    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}
