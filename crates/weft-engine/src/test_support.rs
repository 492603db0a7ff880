//! Minimal in-memory host container for unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use weft_core::host::{BoxedService, HostContainer, ServiceRegistry};
use weft_core::module::Module;

/// A host that only tracks services and config sections.
#[derive(Default)]
pub(crate) struct TestHost {
    services: ServiceRegistry,
    sections: RwLock<HashMap<String, Value>>,
    modules: RwLock<Vec<Arc<dyn Module>>>,
}

impl TestHost {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl HostContainer for TestHost {
    fn register_module(&self, module: Arc<dyn Module>) -> anyhow::Result<()> {
        self.modules.write().push(module);
        Ok(())
    }

    fn register_service(&self, name: &str, service: BoxedService) {
        self.services.register(name, service);
    }

    fn register_config_section(&self, name: &str, section: Value) {
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
        Ok(())
    }

    async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
