//! Host-container facade and service registry.
//!
//! The engine core does not own modules; it registers them with a hosting
//! container and talks to everything else through the container's service
//! registry. [`HostContainer`] is the minimal surface the core consumes —
//! concrete containers live outside the core (the runtime crate ships an
//! in-process default).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::module::Module;

/// Well-known service name under which the engine registers itself.
///
/// Triggers resolve this to obtain their [`WorkflowSink`](crate::trigger::WorkflowSink)
/// callback.
pub const WORKFLOW_ENGINE_SERVICE: &str = "workflowEngine";

/// A type-erased service value.
pub type BoxedService = Arc<dyn Any + Send + Sync>;

// =============================================================================
// ServiceRegistry
// =============================================================================

/// Named services shared between modules.
///
/// The registry is written exclusively during the build phase (module init
/// and wiring hooks, both single-threaded) and treated as read-only
/// thereafter, so a plain `RwLock` suffices.
///
/// # Trait-object services
///
/// `Any` downcasting requires a sized type, so trait-object services are
/// registered as `Arc<Arc<dyn Trait>>` and read back with
/// `get_as::<Arc<dyn Trait>>(name)`.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, BoxedService>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under `name`.
    ///
    /// Re-registering a name replaces the previous value; the replacement
    /// is logged because it usually means two modules claim the same name.
    pub fn register(&self, name: &str, service: BoxedService) {
        let mut entries = self.entries.write();
        if entries.insert(name.to_string(), service).is_some() {
            warn!(service = %name, "Service re-registered — last registration wins");
        } else {
            debug!(service = %name, "Service registered");
        }
    }

    /// Gets a service by name.
    pub fn get(&self, name: &str) -> Option<BoxedService> {
        self.entries.read().get(name).cloned()
    }

    /// Gets a service by name, downcast to a concrete type.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).and_then(|svc| svc.downcast::<T>().ok())
    }

    /// Returns whether a service with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Returns all registered service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// =============================================================================
// HostContainer
// =============================================================================

/// The facade the engine core consumes from the hosting module-container.
///
/// Module instances are owned by the host; the core holds weak knowledge of
/// them through the service registry and must not outlive the container.
#[async_trait]
pub trait HostContainer: Send + Sync {
    /// Registers a constructed module with the container.
    ///
    /// Module names are unique across the built engine; a duplicate name is
    /// an error.
    fn register_module(&self, module: Arc<dyn Module>) -> anyhow::Result<()>;

    /// Registers a named service into the service registry.
    fn register_service(&self, name: &str, service: BoxedService);

    /// Registers a named configuration section.
    ///
    /// Sections are opaque to the host; modules read them back during init.
    fn register_config_section(&self, name: &str, section: Value);

    /// Returns a previously registered configuration section.
    fn config_section(&self, name: &str) -> Option<Value>;

    /// Gets a service by name.
    fn get_service(&self, name: &str) -> Option<BoxedService>;

    /// Returns the container's service registry.
    fn services(&self) -> &ServiceRegistry;

    /// Initialises all registered modules in dependency order.
    ///
    /// The order is derived from each module's `dependencies()` and
    /// `requires_services()`; any module error aborts.
    async fn init(&self) -> anyhow::Result<()>;

    /// Starts module lifecycles in init order.
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()>;

    /// Stops module lifecycles in reverse order.
    async fn stop(&self) -> anyhow::Result<()>;
}
