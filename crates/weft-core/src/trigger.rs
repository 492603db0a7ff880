//! Trigger contract and the callback surface triggers use.
//!
//! A trigger is a source of external events: an HTTP listener, a schedule
//! tick, a message subscription, a reconciliation timer. When its source
//! fires it calls back into the engine through [`WorkflowSink`], which the
//! engine registers in the service registry as
//! [`WORKFLOW_ENGINE_SERVICE`](crate::host::WORKFLOW_ENGINE_SERVICE).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::host::HostContainer;
use crate::value::ConfigMap;

// =============================================================================
// WorkflowSink
// =============================================================================

/// The engine surface a trigger dispatches into.
#[async_trait]
pub trait WorkflowSink: Send + Sync {
    /// Resolves an inbound event to a workflow handler and executes it.
    async fn trigger_workflow(
        &self,
        workflow_type: &str,
        action: &str,
        data: Value,
    ) -> anyhow::Result<Value>;
}

// =============================================================================
// Trigger
// =============================================================================

/// Everything a trigger needs at start time.
#[derive(Clone)]
pub struct TriggerContext {
    /// Lifetime context; the trigger must observe cancellation and return
    /// promptly from `start` and from in-flight dispatches.
    pub cancel: CancellationToken,
    /// The engine callback.
    pub engine: Arc<dyn WorkflowSink>,
}

/// A registered source of external events.
///
/// Triggers are owned by the engine: configured after host init, started
/// after host start, stopped before host stop.
#[async_trait]
pub trait Trigger: Send + Sync {
    /// Returns the trigger's well-known name, which is also the key a
    /// `triggers.{type}` block binds to (`http`, `schedule`, `event`,
    /// `eventbus`, `reconciliation`, `mock`).
    fn name(&self) -> &str;

    /// Applies a `triggers.{type}` configuration block.
    async fn configure(&self, host: &dyn HostContainer, block: &Value) -> anyhow::Result<()>;

    /// Starts the trigger's long-lived task.
    async fn start(&self, ctx: TriggerContext) -> anyhow::Result<()>;

    /// Stops the trigger.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Constructs a trigger from `(name, configuration map)`.
pub type TriggerFactory =
    Arc<dyn Fn(&str, &ConfigMap) -> anyhow::Result<Arc<dyn Trigger>> + Send + Sync>;

// =============================================================================
// Event sources
// =============================================================================

/// An externally-originated event, already resolved to workflow terms.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    /// Workflow type to dispatch.
    pub workflow_type: String,
    /// Action to dispatch.
    pub action: String,
    /// Event payload.
    pub data: Value,
}

impl TriggerEvent {
    /// Creates an event.
    pub fn new(workflow_type: impl Into<String>, action: impl Into<String>, data: Value) -> Self {
        Self {
            workflow_type: workflow_type.into(),
            action: action.into(),
            data,
        }
    }
}

/// A stream of [`TriggerEvent`]s published by a module (an HTTP server, a
/// message broker) for a bridge trigger to consume.
///
/// Sources are registered in the service registry; the consuming trigger
/// resolves them by name at configure time.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Receives the next event, or `None` once the source is closed.
    async fn recv(&self) -> Option<TriggerEvent>;
}

/// A channel-backed [`EventSource`].
///
/// The producing side keeps the `Sender`; the receiver is handed to exactly
/// one consuming trigger.
pub struct ChannelEventSource {
    rx: Mutex<mpsc::Receiver<TriggerEvent>>,
}

impl ChannelEventSource {
    /// Creates a bounded source, returning the producer handle and the
    /// source to register.
    pub fn channel(buffer: usize) -> (mpsc::Sender<TriggerEvent>, Arc<Self>) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Arc::new(Self { rx: Mutex::new(rx) }))
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn recv(&self) -> Option<TriggerEvent> {
        self.rx.lock().await.recv().await
    }
}
