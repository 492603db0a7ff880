//! In-process host container.
//!
//! [`InProcessHost`] is the default [`HostContainer`]: it owns the module
//! instances, derives init order from `dependencies()` plus
//! `requires_services()`, runs init in dependency layers, and drives
//! start/stop lifecycles in init order / reverse init order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use weft_core::host::{BoxedService, HostContainer, ServiceRegistry};
use weft_core::module::Module;

/// Computes module init order as **layers** via Kahn's algorithm.
///
/// Dependency edges come from two places:
/// - `dependencies()` — an explicit module-name edge;
/// - `requires_services()` — an edge to whichever module's
///   `provides_services()` names the wanted service.
///
/// Unresolved service requirements are logged; the service may be
/// registered directly by the engine (e.g. `workflowEngine`), so the edge
/// is simply dropped. Returns `None` on a dependency cycle.
fn topological_layers(modules: &[Arc<dyn Module>]) -> Option<Vec<Vec<usize>>> {
    // Map: service name → providing module index.
    let mut provider_map: HashMap<String, usize> = HashMap::new();
    for (idx, module) in modules.iter().enumerate() {
        for provision in module.provides_services() {
            if let Some(prev) = provider_map.insert(provision.name.clone(), idx) {
                warn!(
                    service = %provision.name,
                    prev_provider = modules[prev].name(),
                    new_provider = modules[idx].name(),
                    "Duplicate service provider — last registration wins"
                );
            }
        }
    }
    let name_map: HashMap<&str, usize> = modules
        .iter()
        .enumerate()
        .map(|(idx, m)| (m.name(), idx))
        .collect();

    let mut in_degree = vec![0usize; modules.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); modules.len()];
    let mut add_edge = |from: usize, to: usize| {
        if from != to {
            dependents[from].push(to);
            in_degree[to] += 1;
        }
    };

    for (idx, module) in modules.iter().enumerate() {
        for dep in module.dependencies() {
            match name_map.get(dep.as_str()) {
                Some(&provider) => add_edge(provider, idx),
                None => warn!(
                    module = module.name(),
                    dependency = %dep,
                    "Unresolved module dependency — ordering not guaranteed"
                ),
            }
        }
        for requirement in module.requires_services() {
            match provider_map.get(&requirement.name) {
                Some(&provider) => add_edge(provider, idx),
                None => debug!(
                    module = module.name(),
                    service = %requirement.name,
                    "Required service has no providing module — expecting direct registration"
                ),
            }
        }
    }

    // Kahn's algorithm — one layer per BFS frontier.
    let mut layers: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..modules.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut processed = 0;

    while !current.is_empty() {
        processed += current.len();
        let mut next = Vec::new();
        for &idx in &current {
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        layers.push(current);
        current = next;
    }

    if processed != modules.len() {
        let cycle: Vec<&str> = (0..modules.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| modules[i].name())
            .collect();
        error!(cycle_nodes = ?cycle, "Module dependency cycle detected");
        return None;
    }

    Some(layers)
}

/// The default in-process module container.
pub struct InProcessHost {
    modules: RwLock<Vec<Arc<dyn Module>>>,
    services: ServiceRegistry,
    sections: RwLock<HashMap<String, Value>>,
    /// Module indices in init order, recorded by `init` for start/stop.
    init_order: RwLock<Vec<usize>>,
    initialized: AtomicBool,
    running: AtomicBool,
}

impl Default for InProcessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
            services: ServiceRegistry::new(),
            sections: RwLock::new(HashMap::new()),
            init_order: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Returns the registered module names in registration order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    /// Returns a registered module by name.
    pub fn module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules
            .read()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }
}

#[async_trait]
impl HostContainer for InProcessHost {
    fn register_module(&self, module: Arc<dyn Module>) -> anyhow::Result<()> {
        let mut modules = self.modules.write();
        if modules.iter().any(|m| m.name() == module.name()) {
            anyhow::bail!("module already registered: {}", module.name());
        }
        debug!(module = module.name(), "Module registered");
        modules.push(module);
        Ok(())
    }

    fn register_service(&self, name: &str, service: BoxedService) {
        self.services.register(name, service);
    }

    fn register_config_section(&self, name: &str, section: Value) {
        debug!(section = %name, "Config section registered");
        self.sections.write().insert(name.to_string(), section);
    }

    fn config_section(&self, name: &str) -> Option<Value> {
        self.sections.read().get(name).cloned()
    }

    fn get_service(&self, name: &str) -> Option<BoxedService> {
        self.services.get(name)
    }

    fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    async fn init(&self) -> anyhow::Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            anyhow::bail!("host is already initialized");
        }

        let modules: Vec<Arc<dyn Module>> = self.modules.read().clone();
        let Some(layers) = topological_layers(&modules) else {
            let names: Vec<String> = modules.iter().map(|m| m.name().to_string()).collect();
            anyhow::bail!("module dependency cycle involving: {}", names.join(", "));
        };

        let mut order = Vec::with_capacity(modules.len());
        for mut layer in layers {
            // Registration order within a layer keeps init deterministic.
            layer.sort_unstable();
            for idx in layer {
                let module = &modules[idx];
                module
                    .init(self)
                    .await
                    .map_err(|e| anyhow::anyhow!("module '{}' init failed: {e}", module.name()))?;
                for provision in module.provides_services() {
                    self.services.register(&provision.name, provision.service);
                }
                debug!(module = module.name(), "Module initialized");
                order.push(idx);
            }
        }
        *self.init_order.write() = order;

        info!(modules = modules.len(), "Host initialized");
        Ok(())
    }

    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Host is already running");
            return Ok(());
        }

        let modules: Vec<Arc<dyn Module>> = self.modules.read().clone();
        let order = self.init_order.read().clone();
        let mut started = Vec::new();

        for idx in order {
            let module = &modules[idx];
            if let Err(e) = module.start(cancel.child_token()).await {
                error!(module = module.name(), error = %e, "Module failed to start — rolling back");
                for &prev in started.iter().rev() {
                    let prev: &Arc<dyn Module> = &modules[prev];
                    if let Err(stop_err) = prev.stop().await {
                        warn!(module = prev.name(), error = %stop_err, "Rollback stop failed");
                    }
                }
                self.running.store(false, Ordering::SeqCst);
                anyhow::bail!("module '{}' failed to start: {e}", module.name());
            }
            started.push(idx);
        }

        info!("Host started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let modules: Vec<Arc<dyn Module>> = self.modules.read().clone();
        let order = self.init_order.read().clone();
        let mut last_error = None;

        for idx in order.into_iter().rev() {
            let module = &modules[idx];
            if let Err(e) = module.stop().await {
                warn!(module = module.name(), error = %e, "Module stop failed");
                last_error = Some(anyhow::anyhow!(
                    "module '{}' failed to stop: {e}",
                    module.name()
                ));
            }
        }

        info!("Host stopped");
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
