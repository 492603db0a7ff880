//! # Weft
//!
//! A configuration-driven workflow orchestration engine.
//!
//! A single process consumes a declarative description — a tree of named
//! modules, keyed workflows, keyed triggers, keyed pipelines, and a
//! `requires` block — constructs a running composition of reusable
//! components, wires their dependencies, starts their lifecycles, and
//! dispatches externally-originated events to the workflow logic they
//! describe.
//!
//! ## Architecture Layers
//!
//! - **Core** ([`weft_core`]) — the interface contracts everything
//!   composes over: [`Module`], [`PipelineStep`], [`Trigger`],
//!   [`WorkflowHandler`], plus the capability/schema registries, the host
//!   facade and the lifecycle bus.
//! - **Engine** ([`weft_engine`]) — the kernel: plugin loading, config
//!   transforms, the pipeline executor and saga coordinator, workflow
//!   dispatch, trigger lifecycle.
//! - **Runtime** ([`weft_runtime`]) — realisation: the in-process host,
//!   the build orchestrator, configuration loading, logging.
//!
//! ## Example
//!
//! ```ignore
//! use weft::prelude::*;
//! use weft::{CorePlugin, WorkflowEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = WorkflowEngine::new();
//!     engine.load_plugin(&CorePlugin)?;
//!     engine
//!         .build_from_config(serde_json::json!({
//!             "pipelines": {
//!                 "hello": {"steps": [
//!                     {"name": "set", "type": "step.set",
//!                      "config": {"values": {"message": "hello"}}}
//!                 ]}
//!             }
//!         }))
//!         .await?;
//!     engine.start(CancellationToken::new()).await?;
//!
//!     let result = engine
//!         .trigger_workflow("pipeline:hello", "", serde_json::json!({}))
//!         .await?;
//!     println!("{result}");
//!
//!     engine.stop().await?;
//!     Ok(())
//! }
//! ```

pub use weft_core;
pub use weft_engine;
pub use weft_runtime;

// Core contracts
pub use weft_core::{
    CapabilityContract, CapabilityDeclaration, CapabilityRegistry, CapabilityRole, ConfigMap,
    HostContainer, LifecycleBus, LifecycleEvent, Module, ModuleFactory, ModuleSchema,
    PipelineContext, PipelineStep, SchemaRegistry, ServiceRegistry, StepFactory, Trigger,
    TriggerContext, TriggerEvent, TriggerFactory, WORKFLOW_ENGINE_SERVICE, WorkflowHandler,
    WorkflowSink,
};

// Engine kernel
pub use weft_engine::{
    CorePlugin, EngineError, ErrorStrategy, MockTrigger, Pipeline, PipelineExecutor, PipelineSpec,
    Plugin, PluginLoader, PluginManifest, PluginTier, Saga, SagaCoordinator, SagaStatus, StepSpec,
    TriggerSet, WiringHook, WorkflowHandlerRegistry,
};

// Runtime
pub use weft_runtime::{ConfigLoader, EngineConfig, InProcessHost, WorkflowEngine};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use weft_runtime::prelude::*;
}
