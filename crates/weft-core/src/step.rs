//! Pipeline step contract and the context threaded between steps.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::value::ConfigMap;

// =============================================================================
// PipelineContext
// =============================================================================

/// Mutable state carried through a pipeline execution.
///
/// Values written by earlier steps are visible to later steps. The context
/// is owned by a single execution: steps within one pipeline run
/// sequentially, while distinct pipelines may run concurrently with their
/// own contexts.
///
/// Snapshots taken at step boundaries are plain clones of the value map,
/// which keeps compensation replay independent of later mutation.
#[derive(Clone)]
pub struct PipelineContext {
    values: HashMap<String, Value>,
    cancel: CancellationToken,
}

impl PipelineContext {
    /// Creates a context seeded with the inbound data.
    ///
    /// A non-object `data` value is stored under the `"input"` key.
    pub fn new(data: Value, cancel: CancellationToken) -> Self {
        let values = match data {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => HashMap::new(),
            other => {
                let mut m = HashMap::new();
                m.insert("input".to_string(), other);
                m
            }
        };
        Self { values, cancel }
    }

    /// Creates a context from a previously taken snapshot.
    pub fn from_snapshot(snapshot: HashMap<String, Value>, cancel: CancellationToken) -> Self {
        Self {
            values: snapshot,
            cancel,
        }
    }

    /// Reads a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Reads a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Writes a value, returning the previous one if any.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Takes a copy of the current value map.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.clone()
    }

    /// Computes the keys this context added or changed relative to `before`.
    ///
    /// This is the "output snapshot" recorded for a completed step.
    pub fn diff_from(&self, before: &HashMap<String, Value>) -> Map<String, Value> {
        self.values
            .iter()
            .filter(|(k, v)| before.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns the cancellation token for this execution.
    ///
    /// Steps that block on I/O must observe it and return promptly when it
    /// fires.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns whether this execution has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Converts the context into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.values.into_iter().collect())
    }
}

// =============================================================================
// PipelineStep
// =============================================================================

/// A unit within a pipeline.
///
/// Steps are not required to be idempotent; the executor does not retry
/// them automatically. Per-step retry, if desired, is a policy of the step
/// implementation itself.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Returns the step's configured name.
    fn name(&self) -> &str;

    /// Executes the step, reading and writing the shared context.
    async fn execute(&self, ctx: &mut PipelineContext) -> anyhow::Result<()>;
}

/// Constructs a pipeline step from `(name, configuration map)`.
pub type StepFactory =
    Arc<dyn Fn(&str, &ConfigMap) -> anyhow::Result<Arc<dyn PipelineStep>> + Send + Sync>;
