//! Workflow handler contract.
//!
//! A workflow handler interprets the configuration block keyed by a
//! workflow type (`http`, `messaging`, `statemachine`, `pipeline`, …) and
//! executes actions against it. The meaning of the block is entirely the
//! handler's business; the engine only routes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::host::HostContainer;

/// Interprets and executes one (or more) workflow types.
///
/// Handlers must be safe under concurrent invocation; the registry does no
/// serialisation.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    /// Returns whether this handler accepts the given workflow type.
    ///
    /// A handler may accept several types. During dispatch the first
    /// registered accepting handler wins.
    fn can_handle(&self, workflow_type: &str) -> bool;

    /// Applies a `workflows.{type}` configuration block.
    async fn configure_workflow(
        &self,
        host: &dyn HostContainer,
        block: &Value,
    ) -> anyhow::Result<()>;

    /// Executes an action against a configured workflow.
    ///
    /// `cancel` is the engine's lifetime context; long-running handlers
    /// must observe it.
    async fn execute_workflow(
        &self,
        cancel: &CancellationToken,
        workflow_type: &str,
        action: &str,
        data: Value,
    ) -> anyhow::Result<Value>;
}

/// Constructs a workflow handler instance.
///
/// Factories are invoked once per engine build, in plugin-load order.
pub type WorkflowHandlerFactory = Arc<dyn Fn() -> Arc<dyn WorkflowHandler> + Send + Sync>;
