//! The engine's own plugin.
//!
//! Loaded like any other plugin, `CorePlugin` contributes the built-in
//! step factories, the well-known trigger types, the pipeline-trigger
//! config wrappers, and the `config.refs` transform hook.

use std::sync::Arc;

use serde_json::{Value, json};

use weft_core::capability::{CapabilityContract, CapabilityDeclaration, MethodSignature};
use weft_core::step::StepFactory;
use weft_core::trigger::TriggerFactory;

use crate::pipeline::steps;
use crate::plugin::{
    ConfigTransformHook, PipelineTriggerConfigWrapper, Plugin, PluginManifest, TransformHookFn,
};
use crate::transform::expand_config_refs;
use crate::trigger::builtin;

/// Core-tier plugin shipped with the engine.
pub struct CorePlugin;

impl Plugin for CorePlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest::new("weft.core", env!("CARGO_PKG_VERSION"))
            .core()
            .with_capabilities(vec![
                CapabilityDeclaration::provider("workflow-engine"),
                CapabilityDeclaration::provider("event-source"),
            ])
    }

    fn step_factories(&self) -> Vec<(String, StepFactory)> {
        vec![
            ("step.set".to_string(), steps::set_factory()),
            ("step.validate".to_string(), steps::validate_factory()),
            ("step.log".to_string(), steps::log_factory()),
            ("step.delay".to_string(), steps::delay_factory()),
            ("step.transform".to_string(), steps::transform_factory()),
        ]
    }

    fn trigger_factories(&self) -> Vec<(String, TriggerFactory)> {
        vec![
            ("mock".to_string(), builtin::mock_factory()),
            ("schedule".to_string(), builtin::schedule_factory()),
            ("event".to_string(), builtin::event_factory()),
            ("eventbus".to_string(), builtin::eventbus_factory()),
            ("http".to_string(), builtin::http_factory()),
            (
                "reconciliation".to_string(),
                builtin::reconciliation_factory(),
            ),
        ]
    }

    fn pipeline_trigger_wrappers(&self) -> Vec<(String, PipelineTriggerConfigWrapper)> {
        let schedule: PipelineTriggerConfigWrapper = Arc::new(|pipeline, config| {
            json!({
                "jobs": [{
                    "interval": config.get("interval").cloned().unwrap_or(Value::Null),
                    "workflow": format!("pipeline:{pipeline}"),
                    "action": "",
                    "data": config.get("data").cloned().unwrap_or_else(|| json!({})),
                }]
            })
        });
        let reconciliation: PipelineTriggerConfigWrapper = Arc::new(|pipeline, config| {
            json!({
                "interval": config.get("interval").cloned().unwrap_or(Value::Null),
                "workflow": format!("pipeline:{pipeline}"),
                "action": "",
            })
        });
        let passthrough: PipelineTriggerConfigWrapper =
            Arc::new(|_pipeline, config| config.clone());
        vec![
            ("schedule".to_string(), schedule),
            ("reconciliation".to_string(), reconciliation),
            ("mock".to_string(), Arc::clone(&passthrough)),
            ("event".to_string(), Arc::clone(&passthrough)),
            ("eventbus".to_string(), Arc::clone(&passthrough)),
            ("http".to_string(), passthrough),
        ]
    }

    fn capability_contracts(&self) -> Vec<CapabilityContract> {
        vec![
            CapabilityContract::new("workflow-engine", "Dispatches inbound events to workflows")
                .with_interface(vec![MethodSignature::new(
                    "TriggerWorkflow",
                    ["type", "action", "data"],
                    ["result", "error"],
                )]),
            CapabilityContract::new("event-source", "Stream of resolved trigger events")
                .with_interface(vec![MethodSignature::new("Recv", [], ["event"])]),
        ]
    }

    fn config_transform_hooks(&self) -> Vec<ConfigTransformHook> {
        let refs: TransformHookFn = Arc::new(expand_config_refs);
        vec![ConfigTransformHook::new("config.refs", 100, refs)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PluginLoader;

    #[test]
    fn test_core_plugin_loads_cleanly() {
        let mut loader = PluginLoader::new();
        loader.load_plugin(&CorePlugin).unwrap();

        assert!(loader.step_factory("step.set").is_some());
        assert!(loader.step_factory("step.validate").is_some());
        assert!(loader.trigger_wrapper("schedule").is_some());
        assert_eq!(loader.trigger_factories().count(), 6);
        assert!(
            loader
                .capabilities()
                .missing_providers(&["workflow-engine".to_string()])
                .is_empty()
        );
    }

    #[test]
    fn test_schedule_wrapper_targets_the_pipeline() {
        let plugin = CorePlugin;
        let wrappers = plugin.pipeline_trigger_wrappers();
        let (_, wrapper) = wrappers.iter().find(|(k, _)| k == "schedule").unwrap();

        let entry = wrapper("api-pipeline", &json!({"interval": "5s"}));
        assert_eq!(entry["jobs"][0]["workflow"], json!("pipeline:api-pipeline"));
        assert_eq!(entry["jobs"][0]["interval"], json!("5s"));
    }
}
