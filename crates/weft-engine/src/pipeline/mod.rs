//! Pipeline definitions and their realisation into runnable step lists.
//!
//! A pipeline is an ordered sequence of steps with a common error strategy
//! and optional compensation. Definitions arrive as configuration; steps
//! are constructed through the step factories plugins registered.

pub mod executor;
pub mod saga;
pub mod steps;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use weft_core::error::ConfigError;
use weft_core::step::{PipelineStep, StepFactory};
use weft_core::value::ConfigMap;

pub use executor::{PipelineError, PipelineExecutor};
pub use saga::{
    CompensationOrder, CompensationRecord, CompletedStep, Saga, SagaConfig, SagaCoordinator,
    SagaStatus,
};

// =============================================================================
// Declarative shapes
// =============================================================================

/// What happens when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Stop and return the step's error.
    #[default]
    Fail,
    /// Record the failure, continue with the next step.
    Skip,
    /// Stop forward execution and run compensation.
    Compensate,
}

/// One step entry within a pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step instance name.
    pub name: String,
    /// Step type, resolved through the step-factory table.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Step configuration.
    #[serde(default)]
    pub config: ConfigMap,
    /// Optional compensation step undoing this one; recorded on the saga
    /// alongside the step's output snapshot.
    #[serde(default)]
    pub compensation: Option<Box<StepSpec>>,
}

/// The inline trigger block of a pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTriggerSpec {
    /// Trigger type (`http`, `schedule`, …).
    #[serde(rename = "type")]
    pub trigger_type: String,
    /// Trigger-type-specific configuration.
    #[serde(default)]
    pub config: Value,
}

/// A pipeline definition as it appears under `pipelines.{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Ordered step entries.
    pub steps: Vec<StepSpec>,
    /// Error strategy, `fail` by default.
    #[serde(default)]
    pub on_error: ErrorStrategy,
    /// Whole-pipeline timeout as a duration string (`5s`, `2m`).
    #[serde(default)]
    pub timeout: Option<String>,
    /// Optional trigger synthesised into the trigger subsystem.
    #[serde(default)]
    pub trigger: Option<PipelineTriggerSpec>,
    /// Pipeline-level compensation steps, run in declared order.
    #[serde(default)]
    pub compensation: Vec<StepSpec>,
}

// =============================================================================
// Runnable pipeline
// =============================================================================

/// A constructed step plus its optional compensation step.
pub struct BuiltStep {
    /// The step to execute.
    pub step: Arc<dyn PipelineStep>,
    /// Compensation recorded with the completed-step entry.
    pub compensation: Option<Arc<dyn PipelineStep>>,
}

/// A realised pipeline, ready for the executor.
pub struct Pipeline {
    /// Pipeline name.
    pub name: String,
    /// Constructed steps in order.
    pub steps: Vec<BuiltStep>,
    /// Error strategy.
    pub on_error: ErrorStrategy,
    /// Whole-pipeline timeout.
    pub timeout: Option<Duration>,
    /// Pipeline-level compensation steps.
    pub compensation: Vec<Arc<dyn PipelineStep>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("on_error", &self.on_error)
            .field("timeout", &self.timeout)
            .field("compensation", &self.compensation.len())
            .finish()
    }
}

impl Pipeline {
    /// Realises a definition through the given step-factory lookup.
    ///
    /// Unknown step types and unparseable timeouts are fatal.
    pub fn build(
        name: &str,
        spec: &PipelineSpec,
        lookup: &dyn Fn(&str) -> Option<StepFactory>,
    ) -> Result<Self, ConfigError> {
        let timeout = match &spec.timeout {
            Some(value) => Some(weft_core::value::parse_duration(value).map_err(|_| {
                ConfigError::InvalidTimeout {
                    pipeline: name.to_string(),
                    value: value.clone(),
                }
            })?),
            None => None,
        };

        let mut steps = Vec::with_capacity(spec.steps.len());
        for entry in &spec.steps {
            let step = construct_step(entry, lookup)?;
            let compensation = entry
                .compensation
                .as_deref()
                .map(|c| construct_step(c, lookup))
                .transpose()?;
            steps.push(BuiltStep { step, compensation });
        }

        let compensation = spec
            .compensation
            .iter()
            .map(|entry| construct_step(entry, lookup))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            steps,
            on_error: spec.on_error,
            timeout,
            compensation,
        })
    }
}

fn construct_step(
    entry: &StepSpec,
    lookup: &dyn Fn(&str) -> Option<StepFactory>,
) -> Result<Arc<dyn PipelineStep>, ConfigError> {
    let factory = lookup(&entry.step_type)
        .ok_or_else(|| ConfigError::UnknownStepType(entry.step_type.clone()))?;
    factory(&entry.name, &entry.config).map_err(|e| {
        ConfigError::Validation(format!("step '{}' construction failed: {e}", entry.name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lookup(step_type: &str) -> Option<StepFactory> {
        (step_type == "step.set").then(steps::set_factory)
    }

    fn spec(value: Value) -> PipelineSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_unknown_step_type_is_fatal() {
        let spec = spec(json!({
            "steps": [{"name": "s1", "type": "step.nonexistent"}]
        }));
        let err = Pipeline::build("p", &spec, &lookup).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown step type"));
        assert!(msg.contains("step.nonexistent"));
    }

    #[test]
    fn test_timeout_parsing() {
        let good = spec(json!({
            "steps": [{"name": "s1", "type": "step.set"}],
            "timeout": "5s"
        }));
        let pipeline = Pipeline::build("p", &good, &lookup).unwrap();
        assert_eq!(pipeline.timeout, Some(Duration::from_secs(5)));

        let bad = spec(json!({
            "steps": [{"name": "s1", "type": "step.set"}],
            "timeout": "not-a-duration"
        }));
        let err = Pipeline::build("p", &bad, &lookup).unwrap_err();
        assert!(err.to_string().contains("invalid timeout"));
    }

    #[test]
    fn test_default_strategy_is_fail() {
        let spec = spec(json!({"steps": []}));
        assert_eq!(spec.on_error, ErrorStrategy::Fail);
    }
}
