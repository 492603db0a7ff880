//! Module contract and factory type.
//!
//! A module is a named, self-contained component registered with the host
//! container. Each module type (a string tag such as `http.server`) is owned
//! by exactly one plugin, which supplies the factory that constructs
//! instances from `(name, configuration map)`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::host::{BoxedService, HostContainer};
use crate::value::ConfigMap;

/// A service a module contributes to the registry after its init.
pub struct ServiceProvision {
    /// Service name in the registry.
    pub name: String,
    /// The service value.
    pub service: BoxedService,
}

impl ServiceProvision {
    /// Creates a provision entry.
    pub fn new(name: impl Into<String>, service: BoxedService) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }
}

/// A service a module needs before its init can run.
#[derive(Debug, Clone)]
pub struct ServiceDependency {
    /// Service name in the registry.
    pub name: String,
    /// Human-readable type hint, used in diagnostics.
    pub type_hint: String,
    /// Whether any service satisfying the interface is acceptable, rather
    /// than the exact named one.
    pub satisfy_by_interface: bool,
}

impl ServiceDependency {
    /// Creates a required-service entry matched by exact name.
    pub fn named(name: impl Into<String>, type_hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: type_hint.into(),
            satisfy_by_interface: false,
        }
    }
}

/// A named, self-contained component owned by the host container.
///
/// Modules must not store references to other modules during `init`; the
/// service registry is the single point of discovery, and cross-module
/// connections happen in post-init wiring hooks.
#[async_trait]
pub trait Module: Send + Sync {
    /// Returns the module's unique instance name.
    fn name(&self) -> &str;

    /// Names of modules that must initialise before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Services this module contributes after a successful init.
    fn provides_services(&self) -> Vec<ServiceProvision> {
        Vec::new()
    }

    /// Services this module requires before init.
    fn requires_services(&self) -> Vec<ServiceDependency> {
        Vec::new()
    }

    /// Initialises the module. May touch I/O (open handles, listeners).
    async fn init(&self, host: &dyn HostContainer) -> anyhow::Result<()>;

    /// Starts long-running work. The token is the module's lifetime context.
    async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stops long-running work.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Constructs a module instance from `(name, configuration map)`.
///
/// Factories are pure constructors: they must not share mutable state
/// across invocations. The config map is deliberately untyped so each
/// module validates its own schema.
pub type ModuleFactory =
    Arc<dyn Fn(&str, &ConfigMap) -> anyhow::Result<Arc<dyn Module>> + Send + Sync>;
