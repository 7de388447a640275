//! Recover structured data from chat-model replies.
//!
//! Models are told to answer with JSON only, but often wrap it in prose.
//! Extraction tries the whole reply first, then the span from the first `{`
//! to the last `}`. A miss is a normal outcome (`None`), never an error.

use serde_json::{Map, Value};
use tracing::debug;

pub type JsonObject = Map<String, Value>;

/// Parse a raw reply into a JSON object, tolerating surrounding prose.
pub fn extract(raw: &str) -> Option<JsonObject> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        return Some(obj);
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        debug!("Reply has no well-ordered brace pair ({} chars)", raw.len());
        return None;
    }

    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => {
            debug!(
                "No JSON object in reply: {}",
                raw.chars().take(200).collect::<String>()
            );
            None
        }
    }
}

/// Lower-cased copy of the object's keys.
fn lowered(obj: &JsonObject) -> JsonObject {
    obj.iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// Try each candidate key in order, exactly and then case-insensitively,
/// returning the first non-empty string value.
pub fn pick(obj: &JsonObject, keys: &[&str]) -> Option<String> {
    let lower = lowered(obj);
    keys.iter().find_map(|key| {
        non_empty_str(obj.get(*key)).or_else(|| non_empty_str(lower.get(&key.to_lowercase())))
    })
}

/// Like [`pick`], but the value must be a non-empty array made only of strings.
pub fn pick_array(obj: &JsonObject, keys: &[&str]) -> Option<Vec<String>> {
    let lower = lowered(obj);
    keys.iter().find_map(|key| {
        string_array(obj.get(*key)).or_else(|| string_array(lower.get(&key.to_lowercase())))
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}
