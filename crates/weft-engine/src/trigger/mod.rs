//! Trigger subsystem.
//!
//! [`TriggerSet`] holds registered trigger instances, configures each from
//! its `triggers.{type}` block, starts them in registration order after
//! the host starts, and stops them in reverse order before the host stops.
//!
//! Triggers call back into the engine through the `workflowEngine` service
//! (a [`WorkflowSink`](weft_core::trigger::WorkflowSink)); the lifetime
//! context handed to `start` cancels them all at shutdown.

pub mod builtin;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use weft_core::error::{ConfigError, RuntimeError};
use weft_core::host::HostContainer;
use weft_core::trigger::{Trigger, TriggerContext};

use crate::error::EngineError;

/// Default grace period a trigger gets to stop before the engine moves on.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Ordered collection of trigger instances owned by the engine.
pub struct TriggerSet {
    triggers: RwLock<Vec<Arc<dyn Trigger>>>,
    started: Mutex<Vec<Arc<dyn Trigger>>>,
    grace: RwLock<Duration>,
}

impl Default for TriggerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerSet {
    /// Creates an empty set with the default shutdown grace period.
    pub fn new() -> Self {
        Self {
            triggers: RwLock::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            grace: RwLock::new(DEFAULT_SHUTDOWN_GRACE),
        }
    }

    /// Overrides the shutdown grace period.
    pub fn set_shutdown_grace(&self, grace: Duration) {
        *self.grace.write() = grace;
    }

    /// Appends a trigger. Registration order is start order.
    pub fn register(&self, trigger: Arc<dyn Trigger>) {
        let mut triggers = self.triggers.write();
        if triggers.iter().any(|t| t.name() == trigger.name()) {
            warn!(trigger = trigger.name(), "Trigger name already registered — first wins on lookup");
        }
        triggers.push(trigger);
    }

    /// Returns the first trigger registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Trigger>> {
        self.triggers
            .read()
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// Registered trigger names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.triggers
            .read()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Configures each trigger named by a `triggers.{type}` block.
    ///
    /// Runs after host init but before host start. A configured type with
    /// no registered trigger is fatal.
    pub async fn configure(
        &self,
        host: &dyn HostContainer,
        blocks: &BTreeMap<String, Value>,
    ) -> Result<(), EngineError> {
        for (trigger_type, block) in blocks {
            let trigger = self
                .get(trigger_type)
                .ok_or_else(|| ConfigError::UnknownTriggerType(trigger_type.clone()))?;
            trigger.configure(host, block).await.map_err(|e| {
                RuntimeError::TriggerConfigure {
                    trigger: trigger_type.clone(),
                    reason: e.to_string(),
                }
            })?;
            info!(trigger = %trigger_type, "Trigger configured");
        }
        Ok(())
    }

    /// Starts all triggers in registration order.
    ///
    /// If any trigger fails to start, the already-started ones are stopped
    /// in reverse order and the error is returned.
    pub async fn start_all(&self, ctx: TriggerContext) -> Result<(), RuntimeError> {
        let triggers: Vec<Arc<dyn Trigger>> = self.triggers.read().clone();
        let mut started = self.started.lock().await;

        for trigger in triggers {
            match trigger.start(ctx.clone()).await {
                Ok(()) => {
                    info!(trigger = trigger.name(), "Trigger started");
                    started.push(trigger);
                }
                Err(e) => {
                    let failed = RuntimeError::TriggerStart {
                        trigger: trigger.name().to_string(),
                        reason: e.to_string(),
                    };
                    error!(trigger = trigger.name(), error = %e, "Trigger failed to start — rolling back");
                    for other in started.drain(..).rev() {
                        if let Err(stop_err) = other.stop().await {
                            warn!(trigger = other.name(), error = %stop_err, "Rollback stop failed");
                        }
                    }
                    return Err(failed);
                }
            }
        }
        Ok(())
    }

    /// Stops started triggers in reverse order, bounded per trigger by the
    /// grace period.
    ///
    /// Stop errors are collected; the last one is returned.
    pub async fn stop_all(&self) -> Result<(), RuntimeError> {
        let grace = *self.grace.read();
        let mut started = self.started.lock().await;
        let mut last_error = None;

        for trigger in started.drain(..).rev() {
            match tokio::time::timeout(grace, trigger.stop()).await {
                Ok(Ok(())) => info!(trigger = trigger.name(), "Trigger stopped"),
                Ok(Err(e)) => {
                    warn!(trigger = trigger.name(), error = %e, "Trigger stop failed");
                    last_error = Some(RuntimeError::TriggerStop {
                        trigger: trigger.name().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    warn!(trigger = trigger.name(), grace = ?grace, "Trigger did not stop within grace period");
                    last_error = Some(RuntimeError::TriggerStop {
                        trigger: trigger.name().to_string(),
                        reason: format!("did not stop within {grace:?}"),
                    });
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
