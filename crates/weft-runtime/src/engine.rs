//! The workflow engine: build orchestration and runtime lifecycle.
//!
//! [`WorkflowEngine`] realises a declarative config tree into a running
//! composition: plugins populate the registries, `build_from_config`
//! walks the strictly-sequential build phases, `start` brings up the host
//! and the triggers, and `trigger_workflow` dispatches inbound events.
//!
//! Every build phase is fatal on first error — the engine never partially
//! starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use weft_core::error::{ConfigError, InitError, RuntimeError};
use weft_core::event::{LifecycleBus, LifecycleEvent};
use weft_core::handler::WorkflowHandler;
use weft_core::host::{HostContainer, WORKFLOW_ENGINE_SERVICE};
use weft_core::trigger::{Trigger, TriggerContext, WorkflowSink};
use weft_core::value::{self, as_config_map};

use weft_engine::pipeline::{Pipeline, PipelineExecutor, SagaCoordinator};
use weft_engine::plugin::Plugin;
use weft_engine::workflow::{PipelineWorkflowHandler, WorkflowHandlerRegistry};
use weft_engine::{EngineError, PluginLoader, TriggerSet, transform};

use crate::config::{EngineConfig, validate_config};
use crate::host::InProcessHost;

// =============================================================================
// Engine callback service
// =============================================================================

/// The `workflowEngine` service: triggers dispatch through this.
struct EngineSink {
    handlers: Arc<WorkflowHandlerRegistry>,
    cancel: Arc<RwLock<CancellationToken>>,
}

#[async_trait]
impl WorkflowSink for EngineSink {
    async fn trigger_workflow(
        &self,
        workflow_type: &str,
        action: &str,
        data: Value,
    ) -> anyhow::Result<Value> {
        let cancel = self.cancel.read().clone();
        let result = self
            .handlers
            .trigger_workflow(&cancel, workflow_type, action, data)
            .await?;
        Ok(result)
    }
}

// =============================================================================
// WorkflowEngine
// =============================================================================

/// A configuration-driven workflow orchestration engine.
pub struct WorkflowEngine {
    loader: Mutex<PluginLoader>,
    host: Arc<dyn HostContainer>,
    bus: LifecycleBus,
    sagas: Arc<SagaCoordinator>,
    handlers: Arc<WorkflowHandlerRegistry>,
    pipeline_handler: Arc<PipelineWorkflowHandler>,
    triggers: Arc<TriggerSet>,
    sink: Arc<dyn WorkflowSink>,
    /// Engine-owned child of the lifetime context passed to `start`.
    cancel: Arc<RwLock<CancellationToken>>,
    built: AtomicBool,
    ready: AtomicBool,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    /// Creates an engine hosted by a fresh [`InProcessHost`].
    pub fn new() -> Self {
        Self::with_host(Arc::new(InProcessHost::new()))
    }

    /// Creates an engine over a caller-supplied host container.
    pub fn with_host(host: Arc<dyn HostContainer>) -> Self {
        let bus = LifecycleBus::default();
        let sagas = Arc::new(SagaCoordinator::new());
        let executor = Arc::new(PipelineExecutor::new(bus.clone(), Arc::clone(&sagas)));
        let handlers = Arc::new(WorkflowHandlerRegistry::new(bus.clone()));
        let pipeline_handler = Arc::new(PipelineWorkflowHandler::new(executor));
        handlers.register(Arc::clone(&pipeline_handler) as Arc<dyn WorkflowHandler>);

        let cancel = Arc::new(RwLock::new(CancellationToken::new()));
        let sink: Arc<dyn WorkflowSink> = Arc::new(EngineSink {
            handlers: Arc::clone(&handlers),
            cancel: Arc::clone(&cancel),
        });

        Self {
            loader: Mutex::new(PluginLoader::new()),
            host,
            bus,
            sagas,
            handlers,
            pipeline_handler,
            triggers: Arc::new(TriggerSet::new()),
            sink,
            cancel,
            built: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        }
    }

    /// Loads a plugin into the engine's registries.
    pub fn load_plugin(&self, plugin: &dyn Plugin) -> Result<(), EngineError> {
        self.loader.lock().load_plugin(plugin)?;
        Ok(())
    }

    /// Registers a trigger instance directly, ahead of any factory-created
    /// ones.
    pub fn register_trigger(&self, trigger: Arc<dyn Trigger>) {
        self.triggers.register(trigger);
    }

    /// Registers a workflow handler directly, after the built-in pipeline
    /// handler.
    pub fn register_handler(&self, handler: Arc<dyn WorkflowHandler>) {
        self.handlers.register(handler);
    }

    /// The hosting container.
    pub fn host(&self) -> &Arc<dyn HostContainer> {
        &self.host
    }

    /// The saga coordinator.
    pub fn sagas(&self) -> &Arc<SagaCoordinator> {
        &self.sagas
    }

    /// Subscribes to `workflow.*`, `step.*` and `saga.*` events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.bus.subscribe()
    }

    /// Attached pipeline names, sorted.
    pub fn pipeline_names(&self) -> Vec<String> {
        self.pipeline_handler.pipeline_names()
    }

    /// Returns a registered trigger by name.
    pub fn trigger(&self, name: &str) -> Option<Arc<dyn Trigger>> {
        self.triggers.get(name)
    }

    /// Realises a parsed config tree into the hosted composition.
    pub async fn build_from_config(&self, mut tree: Value) -> Result<(), EngineError> {
        if self.built.swap(true, Ordering::SeqCst) {
            return Err(ConfigError::validation("engine is already built").into());
        }

        // Phases 1-4 are synchronous; one loader borrow covers them. The
        // registries freeze here: plugin load is over.
        let config = {
            let loader = self.loader.lock();
            loader.freeze();

            // Phase 1: config transform.
            transform::apply_transforms(loader.transform_hooks(), &mut tree)?;
            let config = EngineConfig::from_value(&tree)?;
            validate_config(&config)?;

            // Phase 2: requires check.
            let missing = loader
                .capabilities()
                .missing_providers(&config.requires.capabilities);
            if !missing.is_empty() {
                return Err(ConfigError::MissingCapability(missing.join(", ")).into());
            }
            for requirement in &config.requires.plugins {
                let Some(loaded) = loader.plugin_version(&requirement.name) else {
                    return Err(ConfigError::MissingPlugin(requirement.name.clone()).into());
                };
                if let Some(min) = &requirement.min_version
                    && !weft_engine::version_at_least(loaded, min)
                {
                    return Err(ConfigError::PluginTooOld {
                        name: requirement.name.clone(),
                        loaded: loaded.to_string(),
                        required: min.clone(),
                    }
                    .into());
                }
            }

            // Phase 3: module construction, in declarative order.
            for entry in &config.modules {
                let factory = loader
                    .module_factory(&entry.module_type)
                    .ok_or_else(|| ConfigError::UnknownModuleType(entry.module_type.clone()))?;
                let module = factory(&entry.name, &entry.config).map_err(|e| {
                    InitError::ModuleConstruction {
                        module: entry.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                self.host
                    .register_module(module)
                    .map_err(|e| InitError::ModuleRegistration {
                        module: entry.name.clone(),
                        reason: e.to_string(),
                    })?;
                debug!(module = %entry.name, module_type = %entry.module_type, "Module constructed");
            }

            // Phase 4: config sections — user-supplied first, then
            // defaults synthesised from the schemas of the module types in
            // use.
            self.host.register_config_section(
                "platform",
                serde_json::to_value(&config.platform).unwrap_or_default(),
            );
            for (name, section) in &config.sections {
                self.host.register_config_section(name, section.clone());
            }
            for entry in &config.modules {
                if let Some(schema) = loader.schemas().get(&entry.module_type)
                    && let Some(section_name) = &schema.config_section
                    && self.host.config_section(section_name).is_none()
                {
                    self.host
                        .register_config_section(section_name, schema.default_section());
                }
            }

            // The engine registers itself before init so module init and
            // wiring hooks can resolve it.
            self.host.register_service(
                WORKFLOW_ENGINE_SERVICE,
                Arc::new(Arc::clone(&self.sink)),
            );

            // Handler factories instantiate once, in plugin-load order,
            // after the built-in pipeline handler.
            for factory in loader.handler_factories() {
                self.handlers.register(factory());
            }

            config
        };

        // Phase 5: host init — per-module init in dependency order.
        self.host
            .init()
            .await
            .map_err(|e| InitError::Host(e.to_string()))?;

        // Phase 6: wiring hooks in descending priority order.
        {
            let loader = self.loader.lock();
            for registered in loader.wiring_hooks() {
                debug!(hook = %registered.name, priority = registered.priority, "Wiring hook");
                (registered.hook.hook)(self.host.as_ref(), &tree).map_err(|e| {
                    InitError::WiringHook {
                        hook: registered.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        // Phase 7: workflow configuration — first accepting handler wins.
        for (workflow_type, block) in &config.workflows {
            let handler = self
                .handlers
                .handler_for(workflow_type)
                .ok_or_else(|| ConfigError::NoWorkflowHandler(workflow_type.clone()))?;
            handler
                .configure_workflow(self.host.as_ref(), block)
                .await
                .map_err(|e| InitError::WorkflowConfigure {
                    workflow_type: workflow_type.clone(),
                    reason: e.to_string(),
                })?;
        }

        // Phase 8: triggers — instantiate the well-known types, then
        // configure every `triggers.{type}` block.
        if let Some(grace) = &config.platform.shutdown_grace {
            let grace = value::parse_duration(grace).map_err(|_| {
                ConfigError::validation(format!("invalid platform.shutdown_grace '{grace}'"))
            })?;
            self.triggers.set_shutdown_grace(grace);
        }
        {
            let loader = self.loader.lock();
            for (trigger_type, factory) in loader.trigger_factories() {
                if self.triggers.get(trigger_type).is_some() {
                    // A directly registered instance takes precedence.
                    continue;
                }
                let block = config
                    .triggers
                    .get(trigger_type)
                    .map(as_config_map)
                    .unwrap_or_default();
                let trigger =
                    factory(trigger_type, &block).map_err(|e| RuntimeError::TriggerConfigure {
                        trigger: trigger_type.to_string(),
                        reason: e.to_string(),
                    })?;
                self.triggers.register(trigger);
            }
        }
        self.triggers
            .configure(self.host.as_ref(), &config.triggers)
            .await?;

        // Phase 9: pipelines — realise steps, attach, and synthesise
        // trigger entries for inline trigger blocks.
        let synthesised = {
            let loader = self.loader.lock();
            let mut synthesised: Vec<(String, Arc<dyn Trigger>, Value)> = Vec::new();
            for (name, spec) in &config.pipelines {
                let pipeline = Pipeline::build(name, spec, &|step_type| {
                    loader.step_factory(step_type).cloned()
                })?;
                self.pipeline_handler.attach(pipeline);

                if let Some(trigger_spec) = &spec.trigger {
                    let wrapper = loader
                        .trigger_wrapper(&trigger_spec.trigger_type)
                        .ok_or_else(|| {
                            ConfigError::validation(format!(
                                "pipeline '{name}': no trigger wrapper for type '{}'",
                                trigger_spec.trigger_type
                            ))
                        })?;
                    let entry = wrapper(name, &trigger_spec.config);
                    let trigger = self
                        .triggers
                        .get(&trigger_spec.trigger_type)
                        .ok_or_else(|| {
                            ConfigError::UnknownTriggerType(trigger_spec.trigger_type.clone())
                        })?;
                    synthesised.push((trigger_spec.trigger_type.clone(), trigger, entry));
                }
            }
            synthesised
        };
        for (trigger_type, trigger, entry) in synthesised {
            trigger
                .configure(self.host.as_ref(), &entry)
                .await
                .map_err(|e| RuntimeError::TriggerConfigure {
                    trigger: trigger_type,
                    reason: e.to_string(),
                })?;
        }

        info!(
            modules = config.modules.len(),
            workflows = config.workflows.len(),
            pipelines = config.pipelines.len(),
            "Engine built"
        );
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Starts the host, then the triggers in registration order.
    ///
    /// `cancel` is the engine's lifetime context; cancelling it reaches
    /// every trigger and module.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), EngineError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotBuilt.into());
        }
        let lifetime = cancel.child_token();
        *self.cancel.write() = lifetime.clone();

        self.host
            .start(lifetime.child_token())
            .await
            .map_err(|e| RuntimeError::Host(e.to_string()))?;

        let ctx = TriggerContext {
            cancel: lifetime.child_token(),
            engine: Arc::clone(&self.sink),
        };
        if let Err(e) = self.triggers.start_all(ctx).await {
            // Already-started triggers were rolled back; take the host
            // down too.
            let _ = self.host.stop().await;
            return Err(e.into());
        }

        info!("Engine started");
        Ok(())
    }

    /// Stops the triggers in reverse order, then the host.
    ///
    /// Stop errors are collected; the last one is returned after the host
    /// is down.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.cancel.read().cancel();
        let trigger_result = self.triggers.stop_all().await;
        self.host
            .stop()
            .await
            .map_err(|e| RuntimeError::Host(e.to_string()))?;
        info!("Engine stopped");
        trigger_result.map_err(EngineError::from)
    }

    /// Dispatches an inbound event to the first accepting workflow
    /// handler.
    pub async fn trigger_workflow(
        &self,
        workflow_type: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, EngineError> {
        let cancel = self.cancel.read().clone();
        let result = self
            .handlers
            .trigger_workflow(&cancel, workflow_type, action, data)
            .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use weft_core::capability::CapabilityDeclaration;
    use weft_core::module::{Module, ModuleFactory};
    use weft_engine::plugin::{PluginManifest, TransformHookFn, WiringHook, WiringHookFn};
    use weft_engine::{CorePlugin, MockTrigger};

    // ─── Test plugin scaffolding ─────────────────────────────────────────

    struct RecordingModule {
        name: String,
    }

    #[async_trait]
    impl Module for RecordingModule {
        fn name(&self) -> &str {
            &self.name
        }
        async fn init(&self, _host: &dyn HostContainer) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestPlugin {
        name: String,
        provides: Vec<String>,
        module_types: Vec<String>,
        wiring: Vec<WiringHook>,
        transforms: Vec<weft_engine::ConfigTransformHook>,
    }

    impl TestPlugin {
        fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Default::default()
            }
        }
    }

    impl Plugin for TestPlugin {
        fn manifest(&self) -> PluginManifest {
            PluginManifest::new(&self.name, "1.0.0").with_capabilities(
                self.provides
                    .iter()
                    .map(|c| CapabilityDeclaration::provider(c.clone()))
                    .collect(),
            )
        }

        fn module_factories(&self) -> Vec<(String, ModuleFactory)> {
            self.module_types
                .iter()
                .map(|t| {
                    let factory: ModuleFactory = Arc::new(|name, _config| {
                        Ok(Arc::new(RecordingModule {
                            name: name.to_string(),
                        }) as Arc<dyn Module>)
                    });
                    (t.clone(), factory)
                })
                .collect()
        }

        fn wiring_hooks(&self) -> Vec<WiringHook> {
            self.wiring.clone()
        }

        fn config_transform_hooks(&self) -> Vec<weft_engine::ConfigTransformHook> {
            self.transforms.clone()
        }
    }

    // ─── Build-phase properties ──────────────────────────────────────────

    #[tokio::test]
    async fn test_unknown_module_type_fails_build() {
        let engine = WorkflowEngine::new();
        let err = engine
            .build_from_config(json!({
                "modules": [{"name": "a", "type": "nonexistent.module.type"}]
            }))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown module type"));
        assert!(msg.contains("nonexistent.module.type"));
    }

    #[tokio::test]
    async fn test_unknown_step_type_fails_build() {
        let engine = WorkflowEngine::new();
        let err = engine
            .build_from_config(json!({
                "pipelines": {
                    "p": {"steps": [{"name": "s", "type": "step.missing"}]}
                }
            }))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown step type"));
        assert!(msg.contains("step.missing"));
    }

    #[tokio::test]
    async fn test_unknown_workflow_type_fails_build() {
        let engine = WorkflowEngine::new();
        let err = engine
            .build_from_config(json!({"workflows": {"http": {}}}))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no handler found for workflow type"));
        assert!(msg.contains("http"));
    }

    #[tokio::test]
    async fn test_requires_missing_capability() {
        let engine = WorkflowEngine::new();
        let mut plugin = TestPlugin::named("web");
        plugin.provides = vec!["http-server".to_string()];
        engine.load_plugin(&plugin).unwrap();

        let err = engine
            .build_from_config(json!({
                "requires": {"capabilities": ["http-server", "message-broker"]}
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("message-broker"));
    }

    #[tokio::test]
    async fn test_requires_satisfied_build_succeeds() {
        let engine = WorkflowEngine::new();
        let mut plugin = TestPlugin::named("infra");
        plugin.provides = vec!["http-server".to_string(), "message-broker".to_string()];
        engine.load_plugin(&plugin).unwrap();

        engine
            .build_from_config(json!({
                "requires": {"capabilities": ["http-server", "message-broker"]}
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_requires_missing_plugin() {
        let engine = WorkflowEngine::new();
        let err = engine
            .build_from_config(json!({
                "requires": {"plugins": [{"name": "ghost"}]}
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_requires_plugin_min_version() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&TestPlugin::named("web")).unwrap();

        let err = engine
            .build_from_config(json!({
                "requires": {"plugins": [{"name": "web", "minVersion": "2.0"}]}
            }))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("web"));
        assert!(msg.contains("2.0"));
    }

    #[tokio::test]
    async fn test_wiring_hooks_run_in_priority_order() {
        let engine = WorkflowEngine::new();

        let writer: WiringHookFn = Arc::new(|host, _cfg| {
            host.register_service("wired.key", Arc::new("payload".to_string()));
            Ok(())
        });
        let reader: WiringHookFn = Arc::new(|host, _cfg| {
            let observed = host
                .services()
                .get_as::<String>("wired.key")
                .is_some_and(|v| *v == "payload");
            host.register_service("wired.observed", Arc::new(observed));
            Ok(())
        });

        let mut plugin = TestPlugin::named("wiring");
        plugin.wiring = vec![
            WiringHook::new("reader", 1, reader),
            WiringHook::new("writer", 10, writer),
        ];
        engine.load_plugin(&plugin).unwrap();
        engine.build_from_config(json!({})).await.unwrap();

        let observed = engine
            .host()
            .services()
            .get_as::<bool>("wired.observed")
            .unwrap();
        assert!(*observed);
    }

    #[tokio::test]
    async fn test_transform_hook_error_aborts_build() {
        let engine = WorkflowEngine::new();
        let failing: TransformHookFn = Arc::new(|_| anyhow::bail!("bad tree"));
        let mut plugin = TestPlugin::named("transforms");
        plugin.transforms = vec![weft_engine::ConfigTransformHook::new("broken", 0, failing)];
        engine.load_plugin(&plugin).unwrap();

        let err = engine.build_from_config(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_config_ref_expansion_end_to_end() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();
        let mut plugin = TestPlugin::named("mods");
        plugin.module_types = vec!["recorder".to_string()];
        engine.load_plugin(&plugin).unwrap();

        engine
            .build_from_config(json!({
                "config": {"greeting": "Hello!"},
                "modules": [{"name": "a", "type": "recorder"}],
                "pipelines": {
                    "greet": {"steps": [
                        {"name": "set", "type": "step.set",
                         "config": {"values": {"greeting": "{{config \"greeting\"}}"}}}
                    ]}
                }
            }))
            .await
            .unwrap();

        let result = engine
            .trigger_workflow("pipeline:greet", "", json!({}))
            .await
            .unwrap();
        assert_eq!(result["greeting"], json!("Hello!"));
    }

    #[tokio::test]
    async fn test_duplicate_module_name_fails_validation() {
        let engine = WorkflowEngine::new();
        let mut plugin = TestPlugin::named("mods");
        plugin.module_types = vec!["recorder".to_string()];
        engine.load_plugin(&plugin).unwrap();

        let err = engine
            .build_from_config(json!({
                "modules": [
                    {"name": "a", "type": "recorder"},
                    {"name": "a", "type": "recorder"}
                ]
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate module name: a"));
    }

    #[tokio::test]
    async fn test_second_build_is_rejected() {
        let engine = WorkflowEngine::new();
        engine.build_from_config(json!({})).await.unwrap();
        let err = engine.build_from_config(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("already built"));
    }

    // ─── Trigger and end-to-end properties ───────────────────────────────

    #[tokio::test]
    async fn test_trigger_configured_exactly_once_before_start() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();

        let mock = Arc::new(MockTrigger::new("mock"));
        engine.register_trigger(Arc::clone(&mock) as Arc<dyn Trigger>);

        engine
            .build_from_config(json!({
                "triggers": {"mock": {"marker": 7}}
            }))
            .await
            .unwrap();
        assert_eq!(mock.configure_count(), 1);
        assert_eq!(mock.configured_with(), vec![json!({"marker": 7})]);

        engine.start(CancellationToken::new()).await.unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_callback_routes_to_pipeline() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();

        let mock = Arc::new(MockTrigger::new("mock"));
        engine.register_trigger(Arc::clone(&mock) as Arc<dyn Trigger>);

        engine
            .build_from_config(json!({
                "pipelines": {
                    "api-pipeline": {"steps": [
                        {"name": "tag", "type": "step.set",
                         "config": {"values": {"handled": true}}}
                    ]}
                }
            }))
            .await
            .unwrap();
        engine.start(CancellationToken::new()).await.unwrap();

        let result = mock
            .fire("pipeline:api-pipeline", "", json!({"request_id": 42}))
            .await
            .unwrap();
        // The inbound data was visible in the pipeline context.
        assert_eq!(result["request_id"], json!(42));
        assert_eq!(result["handled"], json!(true));

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_hello_world_pipeline_through_engine() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();
        engine
            .build_from_config(json!({
                "workflows": {"pipeline": {}},
                "pipelines": {
                    "hello": {"steps": [
                        {"name": "set", "type": "step.set",
                         "config": {"values": {"message": "hello"}}}
                    ]}
                }
            }))
            .await
            .unwrap();

        let result = engine
            .trigger_workflow("pipeline", "hello", json!({}))
            .await
            .unwrap();
        assert_eq!(result["message"], json!("hello"));
    }

    #[tokio::test]
    async fn test_compensation_error_message_reaches_caller() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();
        engine
            .build_from_config(json!({
                "pipelines": {
                    "strict": {
                        "on_error": "compensate",
                        "steps": [
                            {"name": "check", "type": "step.validate",
                             "config": {"strategy": "required_fields",
                                        "required_fields": ["name"]}}
                        ],
                        "compensation": [
                            {"name": "undo", "type": "step.log",
                             "config": {"message": "rolled back"}}
                        ]
                    }
                }
            }))
            .await
            .unwrap();

        let err = engine
            .trigger_workflow("pipeline:strict", "", json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("compensation executed"));
    }

    #[tokio::test]
    async fn test_invalid_pipeline_timeout_fails_build() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();
        let err = engine
            .build_from_config(json!({
                "pipelines": {
                    "p": {
                        "timeout": "not-a-duration",
                        "steps": [{"name": "s", "type": "step.log"}]
                    }
                }
            }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid timeout"));
    }

    #[tokio::test]
    async fn test_pipeline_inline_schedule_trigger_dispatches() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();
        engine
            .build_from_config(json!({
                "pipelines": {
                    "ticker": {
                        "steps": [
                            {"name": "tag", "type": "step.set",
                             "config": {"values": {"ticked": true}}}
                        ],
                        "trigger": {"type": "schedule", "config": {"interval": "20ms"}}
                    }
                }
            }))
            .await
            .unwrap();

        let mut events = engine.subscribe_lifecycle();
        engine.start(CancellationToken::new()).await.unwrap();

        // The synthesised schedule job dispatches the pipeline.
        let completed = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            loop {
                if let LifecycleEvent::WorkflowCompleted { workflow_type, .. } =
                    events.recv().await.unwrap()
                    && workflow_type == "pipeline:ticker"
                {
                    break;
                }
            }
        })
        .await;
        assert!(completed.is_ok());

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_synthesised_config_section_from_schema() {
        use weft_core::schema::{ConfigField, FieldKind, ModuleSchema};

        struct SchemaPlugin;
        impl Plugin for SchemaPlugin {
            fn manifest(&self) -> PluginManifest {
                PluginManifest::new("scheduler", "1.0.0")
            }
            fn module_factories(&self) -> Vec<(String, ModuleFactory)> {
                let factory: ModuleFactory = Arc::new(|name, _config| {
                    Ok(Arc::new(RecordingModule {
                        name: name.to_string(),
                    }) as Arc<dyn Module>)
                });
                vec![("scheduler".to_string(), factory)]
            }
            fn module_schemas(&self) -> Vec<(String, ModuleSchema)> {
                let schema = ModuleSchema::new("Scheduler", "platform", "Runs cron jobs")
                    .field(
                        ConfigField::new("tick", FieldKind::String)
                            .default_value(json!("1s")),
                    )
                    .config_section("scheduler");
                vec![("scheduler".to_string(), schema)]
            }
        }

        let engine = WorkflowEngine::new();
        engine.load_plugin(&SchemaPlugin).unwrap();
        engine
            .build_from_config(json!({
                "modules": [{"name": "cron", "type": "scheduler"}]
            }))
            .await
            .unwrap();

        assert_eq!(
            engine.host().config_section("scheduler"),
            Some(json!({"tick": "1s"}))
        );
    }

    #[tokio::test]
    async fn test_start_before_build_is_rejected() {
        let engine = WorkflowEngine::new();
        let err = engine.start(CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("not been built"));
    }

    #[tokio::test]
    async fn test_lifecycle_events_for_dispatch() {
        let engine = WorkflowEngine::new();
        engine.load_plugin(&CorePlugin).unwrap();
        engine
            .build_from_config(json!({
                "pipelines": {
                    "hello": {"steps": [
                        {"name": "set", "type": "step.set",
                         "config": {"values": {"message": "hello"}}}
                    ]}
                }
            }))
            .await
            .unwrap();

        let mut rx = engine.subscribe_lifecycle();
        engine
            .trigger_workflow("pipeline:hello", "", json!({}))
            .await
            .unwrap();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(names.first(), Some(&"workflow.started"));
        assert!(names.contains(&"step.completed"));
        assert_eq!(names.last(), Some(&"workflow.completed"));
    }
}
