//! Config transform pipeline.
//!
//! Before anything is built, the parsed config tree is passed through
//! every plugin-supplied transform hook in descending priority order. The
//! canonical use case is reference expansion: a `config` section declares
//! values, and the built-in `config.refs` hook resolves
//! `{{config "key"}}` placeholders throughout the rest of the tree.

use serde_json::Value;
use tracing::debug;

use weft_core::error::ConfigError;

use crate::loader::RegisteredHook;
use crate::plugin::ConfigTransformHook;

/// Runs all transform hooks over the tree. Any hook error is fatal.
pub fn apply_transforms(
    hooks: &[RegisteredHook<ConfigTransformHook>],
    tree: &mut Value,
) -> Result<(), ConfigError> {
    for registered in hooks {
        debug!(hook = %registered.name, priority = registered.priority, "Config transform");
        (registered.hook.hook)(tree).map_err(|e| ConfigError::TransformFailed {
            hook: registered.name.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

// =============================================================================
// {{config "key"}} expansion
// =============================================================================

const REF_OPEN: &str = "{{config \"";
const REF_CLOSE: &str = "\"}}";

/// Expands `{{config "key"}}` references against the tree's `config`
/// section.
///
/// A string that consists of exactly one reference is replaced by the
/// referenced value with its type preserved; references embedded in a
/// longer string are stringified in place. An unknown key is an error
/// naming the key.
pub fn expand_config_refs(tree: &mut Value) -> anyhow::Result<()> {
    let sources = match tree.get("config") {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };

    fn render(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn expand_str(s: &str, sources: &serde_json::Map<String, Value>) -> anyhow::Result<Option<Value>> {
        if !s.contains(REF_OPEN) {
            return Ok(None);
        }

        // Whole-string reference: keep the referenced value's type.
        if let Some(inner) = s.strip_prefix(REF_OPEN).and_then(|r| r.strip_suffix(REF_CLOSE))
            && !inner.contains('"')
        {
            let value = sources
                .get(inner)
                .ok_or_else(|| anyhow::anyhow!("unknown config reference: {inner}"))?;
            return Ok(Some(value.clone()));
        }

        // Embedded references: stringify each in place.
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find(REF_OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + REF_OPEN.len()..];
            let Some(end) = after.find(REF_CLOSE) else {
                // Unterminated reference; leave the remainder verbatim.
                out.push_str(&rest[start..]);
                return Ok(Some(Value::String(out)));
            };
            let key = &after[..end];
            let value = sources
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("unknown config reference: {key}"))?;
            out.push_str(&render(value));
            rest = &after[end + REF_CLOSE.len()..];
        }
        out.push_str(rest);
        Ok(Some(Value::String(out)))
    }

    fn walk(value: &mut Value, sources: &serde_json::Map<String, Value>) -> anyhow::Result<()> {
        match value {
            Value::String(s) => {
                if let Some(replacement) = expand_str(s, sources)? {
                    *value = replacement;
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, sources)?;
                }
            }
            Value::Object(map) => {
                for (_, v) in map.iter_mut() {
                    walk(v, sources)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    // The `config` section itself is left untouched so its declared values
    // survive for later inspection.
    if let Value::Object(map) = tree {
        for (key, v) in map.iter_mut() {
            if key != "config" {
                walk(v, &sources)?;
            }
        }
    }
    Ok(())
}
