//! # Weft Core
//!
//! Contracts and data model for the Weft workflow orchestration engine.
//!
//! This crate defines the interface contracts the engine composes over —
//! each an open set implemented by plugins:
//!
//! - [`Module`] — a named component owned by the host container
//! - [`PipelineStep`] — a unit within a pipeline, sharing a [`PipelineContext`]
//! - [`Trigger`] — a source of external events dispatching via [`WorkflowSink`]
//! - [`WorkflowHandler`] — interprets a workflow-type config block
//!
//! plus the engine-wide registries populated at plugin load and then frozen
//! ([`CapabilityRegistry`], [`SchemaRegistry`]), the minimal
//! [`HostContainer`] facade the core consumes from its hosting container,
//! the internal [`LifecycleBus`], and the error taxonomy.
//!
//! Factories are plain functions of `(name, config map)`; the config map is
//! deliberately untyped so plugins validate their own schema.

pub mod capability;
pub mod error;
pub mod event;
pub mod handler;
pub mod host;
pub mod module;
pub mod schema;
pub mod step;
pub mod trigger;
pub mod value;

pub use capability::{
    CapabilityContract, CapabilityDeclaration, CapabilityError, CapabilityRegistry,
    CapabilityRole, MethodSignature,
};
pub use error::{ConfigError, ConsistencyError, InitError, RuntimeError};
pub use event::{LifecycleBus, LifecycleEvent};
pub use handler::{WorkflowHandler, WorkflowHandlerFactory};
pub use host::{BoxedService, HostContainer, ServiceRegistry, WORKFLOW_ENGINE_SERVICE};
pub use module::{Module, ModuleFactory, ServiceDependency, ServiceProvision};
pub use schema::{ConfigField, FieldKind, ModuleSchema, SchemaError, SchemaRegistry};
pub use step::{PipelineContext, PipelineStep, StepFactory};
pub use trigger::{
    ChannelEventSource, EventSource, Trigger, TriggerContext, TriggerEvent, TriggerFactory,
    WorkflowSink,
};
pub use value::ConfigMap;
