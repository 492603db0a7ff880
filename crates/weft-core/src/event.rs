//! Internal lifecycle event bus.
//!
//! The orchestrator and the pipeline executor emit `workflow.*`, `step.*`
//! and `saga.*` events; observability modules subscribe at startup via
//! capability lookup. Events are observational, never authoritative: the
//! bus is a tokio broadcast channel, so a lagging subscriber drops the
//! oldest events rather than applying back-pressure to the engine.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Default bus capacity before lagging subscribers start losing events.
const DEFAULT_CAPACITY: usize = 256;

/// A lifecycle event emitted by the engine.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A workflow dispatch began.
    WorkflowStarted {
        /// Workflow type dispatched.
        workflow_type: String,
        /// Action dispatched.
        action: String,
        /// Inbound data.
        data: Value,
    },
    /// A workflow dispatch completed successfully.
    WorkflowCompleted {
        /// Workflow type dispatched.
        workflow_type: String,
        /// Action dispatched.
        action: String,
        /// Handler result.
        result: Value,
    },
    /// A workflow dispatch failed.
    WorkflowFailed {
        /// Workflow type dispatched.
        workflow_type: String,
        /// Action dispatched.
        action: String,
        /// Error message.
        error: String,
    },
    /// A pipeline step began.
    StepStarted {
        /// Owning pipeline.
        pipeline: String,
        /// Step name.
        step: String,
    },
    /// A pipeline step completed.
    StepCompleted {
        /// Owning pipeline.
        pipeline: String,
        /// Step name.
        step: String,
    },
    /// A pipeline step failed.
    StepFailed {
        /// Owning pipeline.
        pipeline: String,
        /// Step name.
        step: String,
        /// Error message.
        error: String,
    },
    /// A saga was created.
    SagaCreated {
        /// Saga id.
        saga_id: String,
        /// Owning pipeline.
        pipeline: String,
    },
    /// A saga completed.
    SagaCompleted {
        /// Saga id.
        saga_id: String,
        /// Owning pipeline.
        pipeline: String,
    },
    /// A saga began compensating.
    SagaCompensating {
        /// Saga id.
        saga_id: String,
        /// Owning pipeline.
        pipeline: String,
    },
    /// A saga finished compensating successfully.
    SagaCompensated {
        /// Saga id.
        saga_id: String,
        /// Owning pipeline.
        pipeline: String,
    },
    /// A saga ended in failure.
    SagaFailed {
        /// Saga id.
        saga_id: String,
        /// Owning pipeline.
        pipeline: String,
        /// Failure message.
        error: String,
    },
}

impl LifecycleEvent {
    /// Returns the dotted event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::WorkflowCompleted { .. } => "workflow.completed",
            Self::WorkflowFailed { .. } => "workflow.failed",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::SagaCreated { .. } => "saga.created",
            Self::SagaCompleted { .. } => "saga.completed",
            Self::SagaCompensating { .. } => "saga.compensating",
            Self::SagaCompensated { .. } => "saga.compensated",
            Self::SagaFailed { .. } => "saga.failed",
        }
    }
}

/// The internal broadcast bus carrying [`LifecycleEvent`]s.
#[derive(Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LifecycleBus {
    /// Creates a bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emits an event. Having no subscribers is not an error.
    pub fn emit(&self, event: LifecycleEvent) {
        trace!(event = event.name(), "Lifecycle event");
        let _ = self.tx.send(event);
    }

    /// Subscribes to the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Returns the current subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_events_arrive_in_emission_order() {
        let bus = LifecycleBus::default();
        let mut rx = bus.subscribe();

        bus.emit(LifecycleEvent::WorkflowStarted {
            workflow_type: "pipeline".into(),
            action: "run".into(),
            data: json!({}),
        });
        bus.emit(LifecycleEvent::WorkflowCompleted {
            workflow_type: "pipeline".into(),
            action: "run".into(),
            result: json!({}),
        });

        assert_eq!(rx.recv().await.unwrap().name(), "workflow.started");
        assert_eq!(rx.recv().await.unwrap().name(), "workflow.completed");
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = LifecycleBus::default();
        bus.emit(LifecycleEvent::SagaCreated {
            saga_id: "saga-1".into(),
            pipeline: "p".into(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
