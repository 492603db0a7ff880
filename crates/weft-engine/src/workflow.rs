//! Workflow handler registry and the built-in pipeline handler.
//!
//! The registry maps workflow-type strings to handler instances, appended
//! in plugin-load order. Dispatch walks the list and the first handler
//! whose `can_handle` accepts the type wins — a handler may register for
//! several types, and first-registered-wins is the documented rule.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use weft_core::error::RuntimeError;
use weft_core::event::{LifecycleBus, LifecycleEvent};
use weft_core::handler::WorkflowHandler;
use weft_core::host::HostContainer;

use crate::pipeline::{Pipeline, PipelineExecutor};

// =============================================================================
// Registry
// =============================================================================

/// Engine-wide, load-ordered list of workflow handlers.
pub struct WorkflowHandlerRegistry {
    handlers: RwLock<Vec<Arc<dyn WorkflowHandler>>>,
    bus: LifecycleBus,
}

impl WorkflowHandlerRegistry {
    /// Creates a registry emitting lifecycle events on `bus`.
    pub fn new(bus: LifecycleBus) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            bus,
        }
    }

    /// Appends a handler. Registration order is dispatch order.
    pub fn register(&self, handler: Arc<dyn WorkflowHandler>) {
        self.handlers.write().push(handler);
    }

    /// Returns the first registered handler accepting `workflow_type`.
    pub fn handler_for(&self, workflow_type: &str) -> Option<Arc<dyn WorkflowHandler>> {
        self.handlers
            .read()
            .iter()
            .find(|h| h.can_handle(workflow_type))
            .cloned()
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Dispatches an inbound event to the first accepting handler,
    /// emitting `workflow.started|completed|failed` around the call.
    ///
    /// Handlers are invoked without serialisation; concurrent dispatches
    /// are the handler's concern.
    pub async fn trigger_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_type: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, RuntimeError> {
        self.bus.emit(LifecycleEvent::WorkflowStarted {
            workflow_type: workflow_type.to_string(),
            action: action.to_string(),
            data: data.clone(),
        });

        let Some(handler) = self.handler_for(workflow_type) else {
            let err = RuntimeError::NoHandler(workflow_type.to_string());
            self.bus.emit(LifecycleEvent::WorkflowFailed {
                workflow_type: workflow_type.to_string(),
                action: action.to_string(),
                error: err.to_string(),
            });
            return Err(err);
        };

        debug!(workflow_type, action, "Dispatching workflow");
        match handler
            .execute_workflow(cancel, workflow_type, action, data)
            .await
        {
            Ok(result) => {
                self.bus.emit(LifecycleEvent::WorkflowCompleted {
                    workflow_type: workflow_type.to_string(),
                    action: action.to_string(),
                    result: result.clone(),
                });
                Ok(result)
            }
            Err(e) => {
                self.bus.emit(LifecycleEvent::WorkflowFailed {
                    workflow_type: workflow_type.to_string(),
                    action: action.to_string(),
                    error: e.to_string(),
                });
                Err(RuntimeError::Handler {
                    workflow_type: workflow_type.to_string(),
                    action: action.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

// =============================================================================
// Pipeline workflow handler
// =============================================================================

/// Handles the `pipeline` workflow type.
///
/// Accepts `pipeline` (with the pipeline name as the action),
/// `pipeline:<name>`, and each attached pipeline's bare name.
pub struct PipelineWorkflowHandler {
    executor: Arc<PipelineExecutor>,
    pipelines: RwLock<HashMap<String, Arc<Pipeline>>>,
}

impl PipelineWorkflowHandler {
    /// Creates a handler running pipelines on `executor`.
    pub fn new(executor: Arc<PipelineExecutor>) -> Self {
        Self {
            executor,
            pipelines: RwLock::new(HashMap::new()),
        }
    }

    /// Attaches a realised pipeline under its name.
    pub fn attach(&self, pipeline: Pipeline) {
        debug!(pipeline = %pipeline.name, "Pipeline attached");
        self.pipelines
            .write()
            .insert(pipeline.name.clone(), Arc::new(pipeline));
    }

    /// Returns the attached pipeline names, sorted.
    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve<'a>(&self, workflow_type: &'a str, action: &'a str) -> &'a str {
        if let Some(name) = workflow_type.strip_prefix("pipeline:") {
            name
        } else if workflow_type == "pipeline" {
            action
        } else {
            workflow_type
        }
    }
}

#[async_trait]
impl WorkflowHandler for PipelineWorkflowHandler {
    fn can_handle(&self, workflow_type: &str) -> bool {
        if workflow_type == "pipeline" {
            return true;
        }
        let pipelines = self.pipelines.read();
        match workflow_type.strip_prefix("pipeline:") {
            Some(name) => pipelines.contains_key(name),
            None => pipelines.contains_key(workflow_type),
        }
    }

    async fn configure_workflow(
        &self,
        _host: &dyn HostContainer,
        _block: &Value,
    ) -> anyhow::Result<()> {
        // Pipelines attach individually from the `pipelines` section; the
        // `workflows.pipeline` block carries no settings of its own yet.
        Ok(())
    }

    async fn execute_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_type: &str,
        action: &str,
        data: Value,
    ) -> anyhow::Result<Value> {
        let name = self.resolve(workflow_type, action);
        let pipeline = self
            .pipelines
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown pipeline: {name}"))?;
        let result = self.executor.execute(&pipeline, data, cancel).await?;
        Ok(result)
    }
}
