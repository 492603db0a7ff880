//! Unified error types for the Weft engine core.
//!
//! The taxonomy mirrors how failures surface to users: configuration
//! mistakes are caught synchronously while the engine is being built,
//! initialisation failures prevent the engine from starting, runtime
//! failures are propagated to the caller of the failing dispatch, and
//! consistency failures guard saga state transitions.
//!
//! Every message carries the offending named element (module, step,
//! workflow type, capability) so a configuration mistake can be pinpointed
//! from the text alone.

use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors detected while realising a declarative configuration.
///
/// All of these are fatal: the engine refuses to build.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No loaded plugin registered a factory for this module type.
    #[error("unknown module type: {0}")]
    UnknownModuleType(String),

    /// No loaded plugin registered a factory for this step type.
    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    /// A `triggers.{type}` block names a type with no registered trigger.
    #[error("no trigger registered for type: {0}")]
    UnknownTriggerType(String),

    /// A `workflows.{type}` block has no handler accepting the type.
    #[error("no handler found for workflow type: {0}")]
    NoWorkflowHandler(String),

    /// A pipeline `timeout` string did not parse as a duration.
    #[error("invalid timeout '{value}' in pipeline '{pipeline}'")]
    InvalidTimeout {
        /// Pipeline that declared the timeout.
        pipeline: String,
        /// The unparseable value.
        value: String,
    },

    /// A `requires.capabilities` entry has no provider-role declaration.
    #[error("required capability has no provider: {0}")]
    MissingCapability(String),

    /// A `requires.plugins` entry names a plugin that is not loaded.
    #[error("required plugin not loaded: {0}")]
    MissingPlugin(String),

    /// A `requires.plugins` entry demands a newer plugin version.
    #[error("plugin '{name}' is too old: loaded {loaded}, required {required}")]
    PluginTooOld {
        /// Plugin name.
        name: String,
        /// Version currently loaded.
        loaded: String,
        /// Minimum version demanded.
        required: String,
    },

    /// Two `modules[]` entries share a name.
    #[error("duplicate module name: {0}")]
    DuplicateModuleName(String),

    /// A config-transform hook rejected the tree.
    #[error("config transform hook '{hook}' failed: {reason}")]
    TransformFailed {
        /// Name of the failing hook.
        hook: String,
        /// Why it failed.
        reason: String,
    },

    /// Structural problem in the configuration tree.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Creates a validation error with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

// =============================================================================
// Initialisation Errors
// =============================================================================

/// Errors raised between module construction and engine start.
///
/// Fatal: the host container is not started and its cleanup path releases
/// anything the factories acquired.
#[derive(Debug, Error)]
pub enum InitError {
    /// The host container failed to initialise.
    #[error("host init failed: {0}")]
    Host(String),

    /// A module's factory rejected its configuration.
    #[error("module '{module}' construction failed: {reason}")]
    ModuleConstruction {
        /// Name of the module entry.
        module: String,
        /// Why construction failed.
        reason: String,
    },

    /// A module could not be registered with the host.
    #[error("module '{module}' registration failed: {reason}")]
    ModuleRegistration {
        /// Name of the module entry.
        module: String,
        /// Why registration failed.
        reason: String,
    },

    /// A module's `init` returned an error.
    #[error("module '{module}' init failed: {reason}")]
    Module {
        /// Name of the failing module.
        module: String,
        /// Why init failed.
        reason: String,
    },

    /// A post-init wiring hook returned an error.
    #[error("wiring hook '{hook}' failed: {reason}")]
    WiringHook {
        /// Name of the failing hook.
        hook: String,
        /// Why the hook failed.
        reason: String,
    },

    /// The module dependency graph contains a cycle.
    #[error("module dependency cycle involving: {0}")]
    DependencyCycle(String),

    /// A workflow handler rejected its configuration block.
    #[error("workflow '{workflow_type}' configuration failed: {reason}")]
    WorkflowConfigure {
        /// The workflow type being configured.
        workflow_type: String,
        /// Why configuration failed.
        reason: String,
    },
}

// =============================================================================
// Runtime Errors
// =============================================================================

/// Errors raised after the engine is built.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Dispatch found no handler accepting the workflow type.
    #[error("no handler found for workflow type: {0}")]
    NoHandler(String),

    /// A workflow handler returned an error.
    #[error("workflow '{workflow_type}' action '{action}' failed: {reason}")]
    Handler {
        /// Workflow type that was dispatched.
        workflow_type: String,
        /// Action that was dispatched.
        action: String,
        /// Handler error message.
        reason: String,
    },

    /// A trigger rejected its configuration block (fatal during build).
    #[error("trigger '{trigger}' configuration failed: {reason}")]
    TriggerConfigure {
        /// Name of the trigger.
        trigger: String,
        /// Why configuration failed.
        reason: String,
    },

    /// A trigger failed to start (fatal; already-started triggers are
    /// stopped in reverse order).
    #[error("trigger '{trigger}' failed to start: {reason}")]
    TriggerStart {
        /// Name of the trigger.
        trigger: String,
        /// Why start failed.
        reason: String,
    },

    /// A trigger failed to stop (collected at shutdown, not fatal).
    #[error("trigger '{trigger}' failed to stop: {reason}")]
    TriggerStop {
        /// Name of the trigger.
        trigger: String,
        /// Why stop failed.
        reason: String,
    },

    /// The host container failed to start or stop.
    #[error("host lifecycle failed: {0}")]
    Host(String),

    /// The engine was asked to start before a successful build.
    #[error("engine has not been built from a configuration")]
    NotBuilt,
}

// =============================================================================
// Consistency Errors
// =============================================================================

/// Violations of the saga state machine.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    /// A mutation was attempted on a saga in a terminal state.
    #[error("saga '{id}' is already terminal ({status})")]
    TerminalSaga {
        /// Saga identifier.
        id: String,
        /// The terminal status it is in.
        status: String,
    },

    /// State was requested for an unknown saga id.
    #[error("unknown saga id: {0}")]
    UnknownSaga(String),
}
