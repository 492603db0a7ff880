//! Helpers for reading dynamic configuration maps.
//!
//! Config maps decoded from YAML or JSON are deliberately untyped
//! (`serde_json::Map`). Numeric values may arrive as either integers or
//! floats depending on the source document, so every numeric reader here
//! accepts both shapes and coerces.

use std::time::Duration;

use serde_json::{Map, Value};

/// The untyped configuration map handed to factories.
pub type ConfigMap = Map<String, Value>;

/// Reads a string field.
pub fn get_str<'a>(map: &'a ConfigMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Reads a string field, falling back to a default.
pub fn get_str_or<'a>(map: &'a ConfigMap, key: &str, default: &'a str) -> &'a str {
    get_str(map, key).unwrap_or(default)
}

/// Reads a boolean field, falling back to a default.
pub fn get_bool(map: &ConfigMap, key: &str, default: bool) -> bool {
    map.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Reads an unsigned integer field, coercing floats with integral values.
pub fn get_u64(map: &ConfigMap, key: &str) -> Option<u64> {
    match map.get(key) {
        Some(Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                Some(u)
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            }
        }
        _ => None,
    }
}

/// Reads a float field, coercing integer values.
pub fn get_f64(map: &ConfigMap, key: &str) -> Option<f64> {
    match map.get(key) {
        Some(Value::Number(n)) => n.as_f64().or_else(|| n.as_i64().map(|i| i as f64)),
        _ => None,
    }
}

/// Reads a list of strings. A bare string is accepted as a singleton list.
pub fn get_str_list(map: &ConfigMap, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Reads a nested object field.
pub fn get_map<'a>(map: &'a ConfigMap, key: &str) -> Option<&'a ConfigMap> {
    map.get(key).and_then(Value::as_object)
}

/// Parses a human-readable duration string such as `5s` or `2m`.
pub fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s.trim())
}

/// Reads a duration field given as a string (`"5s"`) or a number of seconds.
pub fn get_duration(map: &ConfigMap, key: &str) -> Option<Duration> {
    match map.get(key) {
        Some(Value::String(s)) => parse_duration(s).ok(),
        Some(Value::Number(_)) => get_f64(map, key).map(Duration::from_secs_f64),
        _ => None,
    }
}

/// Coerces an arbitrary value into a config map.
///
/// `null` and missing blocks become an empty map; a non-object value is
/// rejected by the caller's own validation.
pub fn as_config_map(value: &Value) -> ConfigMap {
    match value {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}
