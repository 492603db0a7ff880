//! # Weft Engine
//!
//! The engine kernel: everything between "plugins are objects in memory"
//! and "a configuration tree is running".
//!
//! - [`plugin`] / [`loader`] — the extension model and the tables it fills
//! - [`transform`] — pre-construction config rewriting
//! - [`pipeline`] — step sequencing, sagas, compensation, built-in steps
//! - [`workflow`] — workflow-handler registry and the pipeline handler
//! - [`trigger`] — trigger lifecycle and the well-known trigger types
//! - [`CorePlugin`] — the engine's own contributions, loaded like any
//!   other plugin
//!
//! The realisation layer that owns a host container and drives the build
//! phases lives in `weft-runtime`.

pub mod core_plugin;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod plugin;
pub mod transform;
pub mod trigger;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use core_plugin::CorePlugin;
pub use error::EngineError;
pub use loader::{LoadError, PluginLoader, RegisteredHook, version_at_least};
pub use pipeline::{
    BuiltStep, CompensationOrder, CompensationRecord, CompletedStep, ErrorStrategy, Pipeline,
    PipelineError, PipelineExecutor, PipelineSpec, PipelineTriggerSpec, Saga, SagaConfig,
    SagaCoordinator, SagaStatus, StepSpec,
};
pub use plugin::{
    ConfigTransformHook, PipelineTriggerConfigWrapper, Plugin, PluginManifest, PluginTier,
    TransformHookFn, WiringHook, WiringHookFn,
};
pub use transform::{apply_transforms, expand_config_refs};
pub use trigger::builtin::{
    BridgeTrigger, EventTrigger, MockTrigger, ReconciliationTrigger, ScheduleTrigger,
};
pub use trigger::{DEFAULT_SHUTDOWN_GRACE, TriggerSet};
pub use workflow::{PipelineWorkflowHandler, WorkflowHandlerRegistry};
