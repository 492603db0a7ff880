//! Plugin contract.
//!
//! A plugin is a bundle contributing module/step/trigger/workflow-handler
//! factories, module schemas, wiring hooks, config-transform hooks, and
//! capability declarations. Every method is defaulted so a plugin
//! implements only what it contributes.

use std::sync::Arc;

use serde_json::Value;

use weft_core::capability::{CapabilityContract, CapabilityDeclaration};
use weft_core::handler::WorkflowHandlerFactory;
use weft_core::host::HostContainer;
use weft_core::module::ModuleFactory;
use weft_core::schema::ModuleSchema;
use weft_core::step::StepFactory;
use weft_core::trigger::TriggerFactory;

// =============================================================================
// Manifest
// =============================================================================

/// Plugin tier, used only to break ties in hook ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PluginTier {
    /// Engine-shipped plugins. Within equal hook priority, core precedes
    /// non-core.
    Core,
    /// Everything else.
    Extension,
}

/// Identity and claims of a plugin.
#[derive(Debug, Clone)]
pub struct PluginManifest {
    /// Unique plugin name.
    pub name: String,
    /// Dotted numeric version (`1.2.0`).
    pub version: String,
    /// Tier for hook tie-breaking.
    pub tier: PluginTier,
    /// Capability claims this plugin makes.
    pub capabilities: Vec<CapabilityDeclaration>,
}

impl PluginManifest {
    /// Creates an extension-tier manifest with no claims.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tier: PluginTier::Extension,
            capabilities: Vec::new(),
        }
    }

    /// Marks the plugin core-tier.
    pub fn core(mut self) -> Self {
        self.tier = PluginTier::Core;
        self
    }

    /// Adds capability declarations.
    pub fn with_capabilities(mut self, decls: Vec<CapabilityDeclaration>) -> Self {
        self.capabilities = decls;
        self
    }
}

// =============================================================================
// Hooks
// =============================================================================

/// A post-init wiring hook function.
///
/// Runs after `host.init()` with the populated service registry; this is
/// where modules are connected to each other (middleware finds its auth
/// providers, static-file servers attach to a router). The second argument
/// is the full transformed config tree.
pub type WiringHookFn = Arc<dyn Fn(&dyn HostContainer, &Value) -> anyhow::Result<()> + Send + Sync>;

/// A pre-construction config-transform hook function.
///
/// Rewrites the parsed config tree in place (placeholder expansion,
/// defaulting). Any error is fatal: the engine refuses to build.
pub type TransformHookFn = Arc<dyn Fn(&mut Value) -> anyhow::Result<()> + Send + Sync>;

/// A named, prioritised wiring hook.
#[derive(Clone)]
pub struct WiringHook {
    /// Hook name, used in diagnostics.
    pub name: String,
    /// Higher priority runs first.
    pub priority: i32,
    /// The hook function.
    pub hook: WiringHookFn,
}

impl WiringHook {
    /// Creates a wiring hook.
    pub fn new(name: impl Into<String>, priority: i32, hook: WiringHookFn) -> Self {
        Self {
            name: name.into(),
            priority,
            hook,
        }
    }
}

/// A named, prioritised config-transform hook.
#[derive(Clone)]
pub struct ConfigTransformHook {
    /// Hook name, used in diagnostics.
    pub name: String,
    /// Higher priority runs first.
    pub priority: i32,
    /// The hook function.
    pub hook: TransformHookFn,
}

impl ConfigTransformHook {
    /// Creates a transform hook.
    pub fn new(name: impl Into<String>, priority: i32, hook: TransformHookFn) -> Self {
        Self {
            name: name.into(),
            priority,
            hook,
        }
    }
}

/// Produces the `triggers.{type}` config entry that attaches a pipeline's
/// inline `trigger` block to the trigger instance of that type.
///
/// Arguments are the pipeline name and the inline trigger block's `config`.
pub type PipelineTriggerConfigWrapper = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

// =============================================================================
// Plugin
// =============================================================================

/// A bundle of extension points merged into the engine's registries by the
/// plugin loader.
///
/// Plugins live for the lifetime of the engine process.
pub trait Plugin: Send + Sync {
    /// Returns the plugin's manifest.
    fn manifest(&self) -> PluginManifest;

    /// Module factories keyed by module type.
    fn module_factories(&self) -> Vec<(String, ModuleFactory)> {
        Vec::new()
    }

    /// Step factories keyed by step type.
    fn step_factories(&self) -> Vec<(String, StepFactory)> {
        Vec::new()
    }

    /// Trigger factories keyed by trigger type.
    fn trigger_factories(&self) -> Vec<(String, TriggerFactory)> {
        Vec::new()
    }

    /// Workflow-handler factories, registered in load order.
    fn workflow_handler_factories(&self) -> Vec<WorkflowHandlerFactory> {
        Vec::new()
    }

    /// Pipeline-trigger config wrappers keyed by trigger type.
    fn pipeline_trigger_wrappers(&self) -> Vec<(String, PipelineTriggerConfigWrapper)> {
        Vec::new()
    }

    /// Schemas for the module types this plugin owns.
    fn module_schemas(&self) -> Vec<(String, ModuleSchema)> {
        Vec::new()
    }

    /// Capability contracts this plugin defines.
    fn capability_contracts(&self) -> Vec<CapabilityContract> {
        Vec::new()
    }

    /// Post-init wiring hooks.
    fn wiring_hooks(&self) -> Vec<WiringHook> {
        Vec::new()
    }

    /// Pre-construction config-transform hooks.
    fn config_transform_hooks(&self) -> Vec<ConfigTransformHook> {
        Vec::new()
    }
}
