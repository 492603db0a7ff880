//! Plugin loader.
//!
//! [`PluginLoader`] merges each loaded plugin's factories, schemas,
//! capability declarations and hooks into the engine's registries,
//! rejecting duplicates with enough context to name both plugins involved.
//!
//! Loading the same plugin name twice is a hard error rather than a no-op:
//! silently ignoring the second load would mask a wiring mistake that the
//! rest of the error design works to surface.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use weft_core::capability::{CapabilityError, CapabilityRegistry};
use weft_core::handler::WorkflowHandlerFactory;
use weft_core::module::ModuleFactory;
use weft_core::schema::{SchemaError, SchemaRegistry};
use weft_core::step::StepFactory;
use weft_core::trigger::TriggerFactory;

use crate::plugin::{
    ConfigTransformHook, PipelineTriggerConfigWrapper, Plugin, PluginManifest, PluginTier,
    WiringHook,
};

// =============================================================================
// Errors
// =============================================================================

/// Errors from plugin loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The same plugin name was loaded twice.
    #[error("plugin already loaded: {0}")]
    AlreadyLoaded(String),

    /// Two plugins registered the same factory key.
    #[error(
        "duplicate {kind} factory '{key}': registered by plugin '{first}', rejected from plugin '{second}'"
    )]
    DuplicateFactory {
        /// Factory kind (`module`, `step`, `trigger`, `trigger-wrapper`).
        kind: &'static str,
        /// The duplicated key.
        key: String,
        /// Plugin that registered it first.
        first: String,
        /// Plugin whose registration was rejected.
        second: String,
    },

    /// Capability registration failed.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// Schema registration failed.
    #[error("plugin '{plugin}': {source}")]
    Schema {
        /// Offending plugin.
        plugin: String,
        /// Underlying schema error.
        #[source]
        source: SchemaError,
    },
}

// =============================================================================
// Tables
// =============================================================================

struct FactoryEntry<F> {
    plugin: String,
    factory: F,
}

/// A registered hook, retaining load order for tie-breaking.
pub struct RegisteredHook<H> {
    /// Hook name.
    pub name: String,
    /// Higher runs first.
    pub priority: i32,
    /// Owning plugin's tier.
    pub tier: PluginTier,
    /// Monotonic load sequence.
    pub seq: usize,
    /// The hook itself.
    pub hook: H,
}

fn sort_hooks<H>(hooks: &mut [RegisteredHook<H>]) {
    // Priority descending, then core before extension, then load order.
    hooks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.tier.cmp(&b.tier))
            .then_with(|| a.seq.cmp(&b.seq))
    });
}

/// Compares dotted numeric versions, treating missing segments as zero.
pub fn version_at_least(loaded: &str, required: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|seg| seg.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(loaded), parse(required));
    let len = a.len().max(b.len());
    for i in 0..len {
        let (x, y) = (
            a.get(i).copied().unwrap_or(0),
            b.get(i).copied().unwrap_or(0),
        );
        if x != y {
            return x > y;
        }
    }
    true
}

// =============================================================================
// PluginLoader
// =============================================================================

/// Owns every table the plugins populate.
///
/// All tables are written during plugin load (single-threaded, before the
/// build) and read-only afterwards.
pub struct PluginLoader {
    manifests: Vec<PluginManifest>,
    module_factories: HashMap<String, FactoryEntry<ModuleFactory>>,
    step_factories: HashMap<String, FactoryEntry<StepFactory>>,
    trigger_factories: Vec<(String, FactoryEntry<TriggerFactory>)>,
    handler_factories: Vec<(String, WorkflowHandlerFactory)>,
    trigger_wrappers: HashMap<String, FactoryEntry<PipelineTriggerConfigWrapper>>,
    wiring_hooks: Vec<RegisteredHook<WiringHook>>,
    transform_hooks: Vec<RegisteredHook<ConfigTransformHook>>,
    capabilities: Arc<CapabilityRegistry>,
    schemas: Arc<SchemaRegistry>,
    hook_seq: usize,
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginLoader {
    /// Creates an empty loader with fresh registries.
    pub fn new() -> Self {
        Self {
            manifests: Vec::new(),
            module_factories: HashMap::new(),
            step_factories: HashMap::new(),
            trigger_factories: Vec::new(),
            handler_factories: Vec::new(),
            trigger_wrappers: HashMap::new(),
            wiring_hooks: Vec::new(),
            transform_hooks: Vec::new(),
            capabilities: Arc::new(CapabilityRegistry::new()),
            schemas: Arc::new(SchemaRegistry::new()),
            hook_seq: 0,
        }
    }

    /// Merges a plugin's contributions into the engine's registries.
    pub fn load_plugin(&mut self, plugin: &dyn Plugin) -> Result<(), LoadError> {
        let manifest = plugin.manifest();
        let name = manifest.name.clone();

        if self.manifests.iter().any(|m| m.name == name) {
            return Err(LoadError::AlreadyLoaded(name));
        }

        // 1-2. Factory tables; duplicate keys fail with both plugin names.
        for (key, factory) in plugin.module_factories() {
            if let Some(existing) = self.module_factories.get(&key) {
                return Err(LoadError::DuplicateFactory {
                    kind: "module",
                    key,
                    first: existing.plugin.clone(),
                    second: name,
                });
            }
            self.module_factories.insert(
                key,
                FactoryEntry {
                    plugin: name.clone(),
                    factory,
                },
            );
        }
        for (key, factory) in plugin.step_factories() {
            if let Some(existing) = self.step_factories.get(&key) {
                return Err(LoadError::DuplicateFactory {
                    kind: "step",
                    key,
                    first: existing.plugin.clone(),
                    second: name,
                });
            }
            self.step_factories.insert(
                key,
                FactoryEntry {
                    plugin: name.clone(),
                    factory,
                },
            );
        }
        for (key, factory) in plugin.trigger_factories() {
            if let Some((_, existing)) = self.trigger_factories.iter().find(|(k, _)| *k == key) {
                return Err(LoadError::DuplicateFactory {
                    kind: "trigger",
                    key,
                    first: existing.plugin.clone(),
                    second: name,
                });
            }
            self.trigger_factories.push((
                key,
                FactoryEntry {
                    plugin: name.clone(),
                    factory,
                },
            ));
        }
        for factory in plugin.workflow_handler_factories() {
            self.handler_factories.push((name.clone(), factory));
        }
        for (key, wrapper) in plugin.pipeline_trigger_wrappers() {
            if let Some(existing) = self.trigger_wrappers.get(&key) {
                return Err(LoadError::DuplicateFactory {
                    kind: "trigger-wrapper",
                    key,
                    first: existing.plugin.clone(),
                    second: name,
                });
            }
            self.trigger_wrappers.insert(
                key,
                FactoryEntry {
                    plugin: name.clone(),
                    factory: wrapper,
                },
            );
        }

        // 3. Schemas.
        for (module_type, schema) in plugin.module_schemas() {
            self.schemas
                .register(&module_type, schema)
                .map_err(|source| LoadError::Schema {
                    plugin: name.clone(),
                    source,
                })?;
        }

        // 4. Capability contracts and manifest declarations.
        for contract in plugin.capability_contracts() {
            self.capabilities.register_contract(contract)?;
        }
        self.capabilities
            .declare(&name, manifest.capabilities.clone())?;

        // 5. Hooks, kept priority-sorted with tier and load order breaking
        //    ties.
        for hook in plugin.wiring_hooks() {
            self.hook_seq += 1;
            self.wiring_hooks.push(RegisteredHook {
                name: hook.name.clone(),
                priority: hook.priority,
                tier: manifest.tier,
                seq: self.hook_seq,
                hook,
            });
        }
        for hook in plugin.config_transform_hooks() {
            self.hook_seq += 1;
            self.transform_hooks.push(RegisteredHook {
                name: hook.name.clone(),
                priority: hook.priority,
                tier: manifest.tier,
                seq: self.hook_seq,
                hook,
            });
        }
        sort_hooks(&mut self.wiring_hooks);
        sort_hooks(&mut self.transform_hooks);

        debug!(
            plugin = %name,
            version = %manifest.version,
            modules = self.module_factories.len(),
            steps = self.step_factories.len(),
            "Plugin merged"
        );
        info!(plugin = %name, "Plugin loaded");
        self.manifests.push(manifest);
        Ok(())
    }

    /// Returns whether a plugin with this name is loaded.
    pub fn has_plugin(&self, name: &str) -> bool {
        self.manifests.iter().any(|m| m.name == name)
    }

    /// Returns a loaded plugin's version.
    pub fn plugin_version(&self, name: &str) -> Option<&str> {
        self.manifests
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.version.as_str())
    }

    /// Looks up a module factory by type.
    pub fn module_factory(&self, module_type: &str) -> Option<&ModuleFactory> {
        self.module_factories.get(module_type).map(|e| &e.factory)
    }

    /// Looks up a step factory by type.
    pub fn step_factory(&self, step_type: &str) -> Option<&StepFactory> {
        self.step_factories.get(step_type).map(|e| &e.factory)
    }

    /// Trigger factories in registration order.
    pub fn trigger_factories(&self) -> impl Iterator<Item = (&str, &TriggerFactory)> {
        self.trigger_factories
            .iter()
            .map(|(k, e)| (k.as_str(), &e.factory))
    }

    /// Workflow-handler factories in plugin-load order.
    pub fn handler_factories(&self) -> impl Iterator<Item = &WorkflowHandlerFactory> {
        self.handler_factories.iter().map(|(_, f)| f)
    }

    /// Looks up a pipeline-trigger config wrapper by trigger type.
    pub fn trigger_wrapper(&self, trigger_type: &str) -> Option<&PipelineTriggerConfigWrapper> {
        self.trigger_wrappers.get(trigger_type).map(|e| &e.factory)
    }

    /// Wiring hooks in execution order.
    pub fn wiring_hooks(&self) -> &[RegisteredHook<WiringHook>] {
        &self.wiring_hooks
    }

    /// Config-transform hooks in execution order.
    pub fn transform_hooks(&self) -> &[RegisteredHook<ConfigTransformHook>] {
        &self.transform_hooks
    }

    /// The capability registry.
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    /// The module-schema registry.
    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Freezes both registries after the load phase.
    pub fn freeze(&self) {
        self.capabilities.freeze();
        self.schemas.freeze();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::WiringHookFn;
    use std::sync::Arc;
    use weft_core::module::Module;

    struct NullModule(String);

    #[async_trait::async_trait]
    impl Module for NullModule {
        fn name(&self) -> &str {
            &self.0
        }
        async fn init(&self, _host: &dyn weft_core::host::HostContainer) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct TestPlugin {
        manifest: PluginManifest,
        module_types: Vec<&'static str>,
        hooks: Vec<(&'static str, i32)>,
    }

    impl TestPlugin {
        fn named(name: &str) -> Self {
            Self {
                manifest: PluginManifest::new(name, "1.0.0"),
                module_types: Vec::new(),
                hooks: Vec::new(),
            }
        }
    }

    impl Plugin for TestPlugin {
        fn manifest(&self) -> PluginManifest {
            self.manifest.clone()
        }

        fn module_factories(&self) -> Vec<(String, ModuleFactory)> {
            self.module_types
                .iter()
                .map(|t| {
                    let factory: ModuleFactory = Arc::new(|name, _cfg| {
                        Ok(Arc::new(NullModule(name.to_string())) as Arc<dyn Module>)
                    });
                    (t.to_string(), factory)
                })
                .collect()
        }

        fn wiring_hooks(&self) -> Vec<WiringHook> {
            self.hooks
                .iter()
                .map(|(name, priority)| {
                    let f: WiringHookFn = Arc::new(|_, _| Ok(()));
                    WiringHook::new(*name, *priority, f)
                })
                .collect()
        }
    }

    #[test]
    fn test_duplicate_plugin_load_is_an_error() {
        let mut loader = PluginLoader::new();
        loader.load_plugin(&TestPlugin::named("web")).unwrap();
        let err = loader.load_plugin(&TestPlugin::named("web")).unwrap_err();
        assert!(err.to_string().contains("plugin already loaded: web"));
        // The factory tables were not touched twice.
        assert!(loader.has_plugin("web"));
    }

    #[test]
    fn test_duplicate_module_factory_names_both_plugins() {
        let mut loader = PluginLoader::new();
        let mut a = TestPlugin::named("first");
        a.module_types = vec!["http.server"];
        let mut b = TestPlugin::named("second");
        b.module_types = vec!["http.server"];

        loader.load_plugin(&a).unwrap();
        let err = loader.load_plugin(&b).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("http.server"));
        assert!(msg.contains("first"));
        assert!(msg.contains("second"));
    }

    #[test]
    fn test_hook_order_priority_then_tier_then_load_order() {
        let mut loader = PluginLoader::new();

        let mut ext = TestPlugin::named("ext");
        ext.hooks = vec![("ext-high", 10), ("ext-low", 1)];
        let mut core = TestPlugin::named("core");
        core.manifest = PluginManifest::new("core", "1.0.0").core();
        core.hooks = vec![("core-high", 10), ("core-mid", 5)];

        loader.load_plugin(&ext).unwrap();
        loader.load_plugin(&core).unwrap();

        let order: Vec<&str> = loader
            .wiring_hooks()
            .iter()
            .map(|h| h.name.as_str())
            .collect();
        // Equal priority 10: core tier precedes extension.
        assert_eq!(order, vec!["core-high", "ext-high", "core-mid", "ext-low"]);
    }

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("1.2.0", "1.2"));
        assert!(version_at_least("1.10.0", "1.9.9"));
        assert!(!version_at_least("0.9", "1.0.0"));
        assert!(version_at_least("2", "2.0.0"));
    }
}
