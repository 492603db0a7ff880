//! Pipeline executor.
//!
//! Runs an ordered step sequence with context propagation, a
//! whole-pipeline timeout, and a per-step error strategy (fail / skip /
//! compensate). Every execution is tracked as a saga; compensation replays
//! recorded output snapshots through the registered compensation steps.
//!
//! The executor never retries a step: per-step retry, where wanted, is a
//! policy of that step's implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use weft_core::error::ConsistencyError;
use weft_core::event::{LifecycleBus, LifecycleEvent};
use weft_core::step::{PipelineContext, PipelineStep};

use super::saga::{
    CompensationRecord, CompletedStep, PlannedCompensation, Saga, SagaConfig, SagaCoordinator,
    SagaStatus,
};
use super::{ErrorStrategy, Pipeline};

// =============================================================================
// Errors
// =============================================================================

/// Errors from a pipeline execution.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step failed under the `fail` strategy.
    #[error("pipeline '{pipeline}' step '{step}' failed: {reason}")]
    StepFailed {
        /// Owning pipeline.
        pipeline: String,
        /// Failing step.
        step: String,
        /// Step error message.
        reason: String,
    },

    /// The whole-pipeline timeout expired.
    #[error("pipeline '{pipeline}' timed out after {timeout:?}")]
    Timeout {
        /// Owning pipeline.
        pipeline: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// Forward execution stopped and the compensation path ran.
    #[error("pipeline '{pipeline}': {cause}; compensation executed")]
    CompensationExecuted {
        /// Owning pipeline.
        pipeline: String,
        /// What stopped forward execution.
        cause: String,
    },

    /// Saga bookkeeping was violated.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}

struct StepFailure {
    step: String,
    reason: String,
}

// =============================================================================
// Executor
// =============================================================================

/// Runs pipelines. Cheap to clone via its shared parts; safe for
/// concurrent executions, each with its own context and saga.
pub struct PipelineExecutor {
    bus: LifecycleBus,
    sagas: Arc<SagaCoordinator>,
}

impl PipelineExecutor {
    /// Creates an executor emitting on `bus` and tracking sagas in
    /// `sagas`.
    pub fn new(bus: LifecycleBus, sagas: Arc<SagaCoordinator>) -> Self {
        Self { bus, sagas }
    }

    /// The saga coordinator backing this executor.
    pub fn sagas(&self) -> &Arc<SagaCoordinator> {
        &self.sagas
    }

    /// Executes a pipeline over the inbound data.
    ///
    /// `cancel` is the engine's lifetime context. The pipeline's own
    /// timeout cancels only this execution's remaining steps.
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        data: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, PipelineError> {
        let run_token = cancel.child_token();
        let mut ctx = PipelineContext::new(data, run_token.clone());

        let saga = self.sagas.create(
            &pipeline.name,
            SagaConfig {
                timeout: pipeline.timeout,
                order: Default::default(),
            },
        );
        self.bus.emit(LifecycleEvent::SagaCreated {
            saga_id: saga.id().to_string(),
            pipeline: pipeline.name.clone(),
        });
        debug!(pipeline = %pipeline.name, saga = %saga.id(), "Pipeline execution started");

        let outcome = match pipeline.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.run_steps(pipeline, &mut ctx, &saga)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        run_token.cancel();
                        Err(StepFailure {
                            step: "(timeout)".to_string(),
                            reason: format!("timed out after {timeout:?}"),
                        })
                    }
                }
            }
            None => self.run_steps(pipeline, &mut ctx, &saga).await,
        };

        match outcome {
            Ok(()) => {
                saga.complete()?;
                self.bus.emit(LifecycleEvent::SagaCompleted {
                    saga_id: saga.id().to_string(),
                    pipeline: pipeline.name.clone(),
                });
                Ok(ctx.into_value())
            }
            Err(failure) => self.handle_failure(pipeline, &saga, &ctx, failure, cancel).await,
        }
    }

    async fn run_steps(
        &self,
        pipeline: &Pipeline,
        ctx: &mut PipelineContext,
        saga: &Saga,
    ) -> Result<(), StepFailure> {
        for built in &pipeline.steps {
            let step_name = built.step.name().to_string();
            self.bus.emit(LifecycleEvent::StepStarted {
                pipeline: pipeline.name.clone(),
                step: step_name.clone(),
            });

            let before = ctx.snapshot();
            match built.step.execute(ctx).await {
                Ok(()) => {
                    let output = Value::Object(ctx.diff_from(&before));
                    saga.record_step(CompletedStep {
                        name: step_name.clone(),
                        output,
                        completed_at: Instant::now(),
                        compensation: built.compensation.clone(),
                        error: None,
                    })
                    .map_err(|e| StepFailure {
                        step: step_name.clone(),
                        reason: e.to_string(),
                    })?;
                    self.bus.emit(LifecycleEvent::StepCompleted {
                        pipeline: pipeline.name.clone(),
                        step: step_name,
                    });
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.bus.emit(LifecycleEvent::StepFailed {
                        pipeline: pipeline.name.clone(),
                        step: step_name.clone(),
                        error: reason.clone(),
                    });
                    match pipeline.on_error {
                        ErrorStrategy::Skip => {
                            // The failure stays on the saga record for
                            // observability; the pipeline keeps going.
                            warn!(
                                pipeline = %pipeline.name,
                                step = %step_name,
                                error = %reason,
                                "Step failed — skipped"
                            );
                            saga.record_step(CompletedStep {
                                name: step_name.clone(),
                                output: Value::Object(Default::default()),
                                completed_at: Instant::now(),
                                compensation: None,
                                error: Some(reason),
                            })
                            .map_err(|e| StepFailure {
                                step: step_name,
                                reason: e.to_string(),
                            })?;
                        }
                        ErrorStrategy::Fail | ErrorStrategy::Compensate => {
                            return Err(StepFailure {
                                step: step_name,
                                reason,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_failure(
        &self,
        pipeline: &Pipeline,
        saga: &Saga,
        ctx: &PipelineContext,
        failure: StepFailure,
        cancel: &CancellationToken,
    ) -> Result<Value, PipelineError> {
        let cause = if failure.step == "(timeout)" {
            failure.reason.clone()
        } else {
            format!("step '{}' failed: {}", failure.step, failure.reason)
        };

        if pipeline.on_error != ErrorStrategy::Compensate {
            saga.fail(&failure.step, &failure.reason)?;
            self.bus.emit(LifecycleEvent::SagaFailed {
                saga_id: saga.id().to_string(),
                pipeline: pipeline.name.clone(),
                error: cause.clone(),
            });
            return Err(if failure.step == "(timeout)" {
                PipelineError::Timeout {
                    pipeline: pipeline.name.clone(),
                    timeout: pipeline.timeout.unwrap_or_default(),
                }
            } else {
                PipelineError::StepFailed {
                    pipeline: pipeline.name.clone(),
                    step: failure.step,
                    reason: failure.reason,
                }
            });
        }

        self.bus.emit(LifecycleEvent::SagaCompensating {
            saga_id: saga.id().to_string(),
            pipeline: pipeline.name.clone(),
        });
        let plan = saga.begin_compensation(&failure.step, &cause)?;

        // Pipeline-level compensation steps run first, in declared order,
        // against a snapshot of the failing context.
        for step in &pipeline.compensation {
            let record = self
                .run_compensation_step(
                    step.as_ref(),
                    &failure.step,
                    Value::Object(ctx.snapshot().into_iter().collect()),
                    cancel,
                )
                .await;
            saga.record_compensation(record);
        }

        // Then the saga plan: each compensation step receives the original
        // step's output snapshot.
        for planned in &plan {
            let PlannedCompensation {
                compensates,
                output,
                step,
            } = planned;
            let record = self
                .run_compensation_step(step.as_ref(), compensates, output.clone(), cancel)
                .await;
            saga.record_compensation(record);
        }

        let status = saga.finish_compensation()?;
        self.bus.emit(match status {
            SagaStatus::Compensated => LifecycleEvent::SagaCompensated {
                saga_id: saga.id().to_string(),
                pipeline: pipeline.name.clone(),
            },
            _ => LifecycleEvent::SagaFailed {
                saga_id: saga.id().to_string(),
                pipeline: pipeline.name.clone(),
                error: cause.clone(),
            },
        });

        Err(PipelineError::CompensationExecuted {
            pipeline: pipeline.name.clone(),
            cause,
        })
    }

    async fn run_compensation_step(
        &self,
        step: &dyn PipelineStep,
        compensates: &str,
        snapshot: Value,
        cancel: &CancellationToken,
    ) -> CompensationRecord {
        let mut ctx = PipelineContext::new(snapshot, cancel.child_token());
        let error = match step.execute(&mut ctx).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    step = step.name(),
                    compensates = %compensates,
                    error = %e,
                    "Compensation step failed"
                );
                Some(e.to_string())
            }
        };
        CompensationRecord {
            step: step.name().to_string(),
            compensates: compensates.to_string(),
            error,
        }
    }

    /// Drives a timed-out saga through its compensation plan.
    ///
    /// The failure message references the timeout; partial compensation
    /// failures leave the saga `failed` while still running every other
    /// compensation step.
    pub async fn timeout_saga(
        &self,
        saga: &Saga,
        cancel: &CancellationToken,
    ) -> Result<SagaStatus, ConsistencyError> {
        let cause = match saga.config().timeout {
            Some(timeout) => format!("saga timed out after {timeout:?}"),
            None => "saga timed out".to_string(),
        };
        self.bus.emit(LifecycleEvent::SagaCompensating {
            saga_id: saga.id().to_string(),
            pipeline: saga.pipeline().to_string(),
        });
        let plan = saga.begin_compensation("(timeout)", &cause)?;
        for planned in &plan {
            let record = self
                .run_compensation_step(
                    planned.step.as_ref(),
                    &planned.compensates,
                    planned.output.clone(),
                    cancel,
                )
                .await;
            saga.record_compensation(record);
        }
        let status = saga.finish_compensation()?;
        self.bus.emit(match status {
            SagaStatus::Compensated => LifecycleEvent::SagaCompensated {
                saga_id: saga.id().to_string(),
                pipeline: saga.pipeline().to_string(),
            },
            _ => LifecycleEvent::SagaFailed {
                saga_id: saga.id().to_string(),
                pipeline: saga.pipeline().to_string(),
                error: cause,
            },
        });
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::steps;
    use crate::pipeline::{BuiltStep, PipelineSpec};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use weft_core::step::StepFactory;

    /// Step that fails on demand and records invocations.
    struct ProbeStep {
        name: String,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PipelineStep for ProbeStep {
        fn name(&self) -> &str {
            &self.name
        }
        async fn execute(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
            self.calls.lock().push(self.name.clone());
            anyhow::ensure!(!self.fail, "step '{}' exploded", self.name);
            ctx.set(self.name.clone(), json!(true));
            Ok(())
        }
    }

    fn probe(
        name: &str,
        fail: bool,
        calls: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn PipelineStep> {
        Arc::new(ProbeStep {
            name: name.to_string(),
            fail,
            calls: Arc::clone(calls),
        })
    }

    fn executor() -> PipelineExecutor {
        PipelineExecutor::new(LifecycleBus::default(), Arc::new(SagaCoordinator::new()))
    }

    fn pipeline(name: &str, on_error: ErrorStrategy, steps: Vec<BuiltStep>) -> Pipeline {
        Pipeline {
            name: name.to_string(),
            steps,
            on_error,
            timeout: None,
            compensation: Vec::new(),
        }
    }

    fn core_lookup(step_type: &str) -> Option<StepFactory> {
        match step_type {
            "step.set" => Some(steps::set_factory()),
            "step.validate" => Some(steps::validate_factory()),
            "step.log" => Some(steps::log_factory()),
            "step.delay" => Some(steps::delay_factory()),
            _ => None,
        }
    }

    fn build(name: &str, spec: serde_json::Value) -> Pipeline {
        let spec: PipelineSpec = serde_json::from_value(spec).unwrap();
        Pipeline::build(name, &spec, &core_lookup).unwrap()
    }

    #[tokio::test]
    async fn test_hello_world_pipeline() {
        let pipeline = build(
            "hello",
            json!({
                "steps": [
                    {"name": "set", "type": "step.set", "config": {"values": {"message": "hello"}}}
                ]
            }),
        );
        let result = executor()
            .execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["message"], json!("hello"));
    }

    #[tokio::test]
    async fn test_validate_then_set() {
        let spec = json!({
            "steps": [
                {"name": "check", "type": "step.validate",
                 "config": {"strategy": "required_fields", "required_fields": ["name"]}},
                {"name": "greet", "type": "step.set",
                 "config": {"values": {"greeting": "Hello!"}}}
            ]
        });
        let pipeline = build("greet", spec.clone());
        let exec = executor();

        let ok = exec
            .execute(&pipeline, json!({"name": "Test"}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ok["greeting"], json!("Hello!"));

        // Missing input under `fail` aborts.
        let err = exec
            .execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("check"));

        // Under `skip` the pipeline still completes.
        let mut skip_spec = spec;
        skip_spec["on_error"] = json!("skip");
        let skipping = build("greet-skip", skip_spec);
        let result = exec
            .execute(&skipping, json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["greeting"], json!("Hello!"));
    }

    #[tokio::test]
    async fn test_fail_strategy_aborts_remaining_steps() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(
            "p",
            ErrorStrategy::Fail,
            vec![
                BuiltStep {
                    step: probe("one", false, &calls),
                    compensation: None,
                },
                BuiltStep {
                    step: probe("boom", true, &calls),
                    compensation: None,
                },
                BuiltStep {
                    step: probe("never", false, &calls),
                    compensation: None,
                },
            ],
        );
        let err = executor()
            .execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StepFailed { ref step, .. } if step == "boom"));
        assert_eq!(*calls.lock(), vec!["one", "boom"]);
    }

    #[tokio::test]
    async fn test_skip_strategy_records_error_and_continues() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let exec = executor();
        let pipeline = pipeline(
            "p",
            ErrorStrategy::Skip,
            vec![
                BuiltStep {
                    step: probe("boom", true, &calls),
                    compensation: None,
                },
                BuiltStep {
                    step: probe("after", false, &calls),
                    compensation: None,
                },
            ],
        );
        exec.execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(*calls.lock(), vec!["boom", "after"]);

        let saga = exec.sagas().get("saga-1").unwrap();
        assert_eq!(saga.status(), SagaStatus::Completed);
        let records = saga.steps();
        assert!(records[0].error.is_some());
        assert!(records[1].error.is_none());
    }

    #[tokio::test]
    async fn test_compensate_strategy_runs_plan_in_reverse() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let exec = executor();
        let pipeline = pipeline(
            "p",
            ErrorStrategy::Compensate,
            vec![
                BuiltStep {
                    step: probe("s1", false, &calls),
                    compensation: Some(probe("c1", false, &calls)),
                },
                BuiltStep {
                    step: probe("s2", false, &calls),
                    compensation: Some(probe("c2", false, &calls)),
                },
                BuiltStep {
                    step: probe("boom", true, &calls),
                    compensation: None,
                },
            ],
        );
        let err = exec
            .execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("compensation executed"));
        assert_eq!(*calls.lock(), vec!["s1", "s2", "boom", "c2", "c1"]);

        let saga = exec.sagas().get("saga-1").unwrap();
        assert_eq!(saga.status(), SagaStatus::Compensated);
    }

    #[tokio::test]
    async fn test_pipeline_level_compensation_list_runs() {
        let exec = executor();
        let spec = json!({
            "on_error": "compensate",
            "steps": [
                {"name": "check", "type": "step.validate",
                 "config": {"strategy": "required_fields", "required_fields": ["name"]}}
            ],
            "compensation": [
                {"name": "notify", "type": "step.log", "config": {"message": "rolled back"}}
            ]
        });
        let pipeline = build("p", spec);
        let err = exec
            .execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("compensation executed"));

        let saga = exec.sagas().get("saga-1").unwrap();
        let records = saga.compensations();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step, "notify");
        assert!(records[0].error.is_none());
    }

    #[tokio::test]
    async fn test_partial_compensation_ends_failed_but_runs_everything() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let exec = executor();
        let pipeline = pipeline(
            "p",
            ErrorStrategy::Compensate,
            vec![
                BuiltStep {
                    step: probe("s1", false, &calls),
                    compensation: Some(probe("c1", false, &calls)),
                },
                BuiltStep {
                    step: probe("s2", false, &calls),
                    compensation: Some(probe("c2", true, &calls)),
                },
                BuiltStep {
                    step: probe("s3", false, &calls),
                    compensation: Some(probe("c3", false, &calls)),
                },
                BuiltStep {
                    step: probe("boom", true, &calls),
                    compensation: None,
                },
            ],
        );
        exec.execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap_err();

        let saga = exec.sagas().get("saga-1").unwrap();
        assert_eq!(saga.status(), SagaStatus::Failed);
        let records = saga.compensations();
        assert_eq!(records.len(), 3);
        let failed: Vec<&str> = records
            .iter()
            .filter(|r| r.error.is_some())
            .map(|r| r.step.as_str())
            .collect();
        assert_eq!(failed, vec!["c2"]);
    }

    #[tokio::test]
    async fn test_timeout_aborts_pipeline() {
        let pipeline = build(
            "slow",
            json!({
                "timeout": "50ms",
                "steps": [
                    {"name": "wait", "type": "step.delay", "config": {"duration": "5s"}}
                ]
            }),
        );
        let err = executor()
            .execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_timeout_with_compensate_runs_compensation() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let exec = executor();
        let slow_config = json!({"duration": "5s"});
        let wait = steps::delay_factory()("wait", slow_config.as_object().unwrap()).unwrap();
        let mut p = pipeline(
            "slow",
            ErrorStrategy::Compensate,
            vec![
                BuiltStep {
                    step: probe("s1", false, &calls),
                    compensation: Some(probe("c1", false, &calls)),
                },
                BuiltStep {
                    step: wait,
                    compensation: None,
                },
            ],
        );
        p.timeout = Some(Duration::from_millis(50));

        let err = exec
            .execute(&p, json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("compensation executed"));
        assert!(calls.lock().contains(&"c1".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_saga_triggers_plan() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let exec = executor();
        let saga = exec.sagas().create(
            "p",
            SagaConfig {
                timeout: Some(Duration::from_millis(10)),
                order: Default::default(),
            },
        );
        saga.record_step(CompletedStep {
            name: "s1".into(),
            output: json!({}),
            completed_at: Instant::now(),
            compensation: Some(probe("c1", false, &calls)),
            error: None,
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(saga.is_timed_out());

        let status = exec
            .timeout_saga(&saga, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status, SagaStatus::Compensated);
        assert_eq!(*calls.lock(), vec!["c1"]);
        assert!(saga.failure().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_step_events_emitted_in_order() {
        let exec = executor();
        let mut rx = exec.bus.subscribe();
        let pipeline = build(
            "hello",
            json!({
                "steps": [
                    {"name": "set", "type": "step.set", "config": {"values": {"k": 1}}}
                ]
            }),
        );
        exec.execute(&pipeline, json!({}), &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "saga.created",
                "step.started",
                "step.completed",
                "saga.completed"
            ]
        );
    }
}
