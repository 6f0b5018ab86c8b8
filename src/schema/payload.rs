/// Lazy decoding of the JSON payloads attached to conditions and actions.
///
/// Payload keys are matched case-insensitively and without underscores, so
/// `questId`, `QuestId` and `quest_id` all decode into a field renamed to
/// `questid`.
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Recursively lowercases object keys and strips underscores from them.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut normalized = Map::with_capacity(map.len());
            for (key, inner) in map {
                let key: String = key
                    .chars()
                    .filter(|c| *c != '_')
                    .flat_map(char::to_lowercase)
                    .collect();
                normalized.insert(key, normalize_keys(inner));
            }
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// Payloads arrive either as embedded JSON text or as already structured
/// JSON. Empty strings and `null` decode as `null`.
pub fn unwrap_embedded(raw: &Value) -> Result<Value, PayloadError> {
    match raw {
        Value::String(text) if text.trim().is_empty() => Ok(Value::Null),
        Value::String(text) => Ok(serde_json::from_str(text)?),
        other => Ok(other.clone()),
    }
}

/// Decodes a payload into a typed struct after key normalization. A
/// missing payload decodes like an empty object.
pub fn decode<T: DeserializeOwned>(raw: &Value) -> Result<T, PayloadError> {
    let value = match normalize_keys(unwrap_embedded(raw)?) {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
