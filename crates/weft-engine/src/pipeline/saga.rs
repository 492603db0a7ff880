//! Saga coordinator: ordered records of completed steps and their
//! compensations.
//!
//! A saga tracks one pipeline execution so that partial progress can be
//! undone. State transitions are `running → {completed, compensating,
//! failed}` and `compensating → {compensated, failed}`; the terminal states
//! are `completed`, `compensated` and `failed`, and any mutation after a
//! terminal state is a [`ConsistencyError`].
//!
//! Saga state is kept in memory. A persistent backend belongs behind this
//! same interface, not inside it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use weft_core::error::ConsistencyError;
use weft_core::step::PipelineStep;

// =============================================================================
// State model
// =============================================================================

/// Saga lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStatus {
    /// Forward execution in progress.
    Running,
    /// Compensation in progress.
    Compensating,
    /// All steps completed; terminal.
    Completed,
    /// Compensation finished cleanly; terminal.
    Compensated,
    /// Execution or compensation failed; terminal.
    Failed,
}

impl SagaStatus {
    /// Returns whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Compensated | Self::Failed)
    }

    /// Lowercase name used in messages and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Compensating => "compensating",
            Self::Completed => "completed",
            Self::Compensated => "compensated",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which compensation steps run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompensationOrder {
    /// Undo most recent work first (default).
    #[default]
    Reverse,
    /// Undo in completion order.
    Forward,
}

/// Per-saga configuration.
#[derive(Debug, Clone, Default)]
pub struct SagaConfig {
    /// Wall-clock budget; `None` disables timeout tracking.
    pub timeout: Option<Duration>,
    /// Compensation order.
    pub order: CompensationOrder,
}

/// Record of one completed (or, under `skip`, attempted) step.
#[derive(Clone)]
pub struct CompletedStep {
    /// Step name.
    pub name: String,
    /// Snapshot of the outputs the step added.
    pub output: Value,
    /// Completion time.
    pub completed_at: Instant,
    /// Compensation step registered for this record, if any.
    pub compensation: Option<Arc<dyn PipelineStep>>,
    /// Error recorded when the step was skipped rather than completed.
    pub error: Option<String>,
}

/// Outcome of one compensation step.
#[derive(Debug, Clone)]
pub struct CompensationRecord {
    /// Compensation step name.
    pub step: String,
    /// Name of the original step it compensates.
    pub compensates: String,
    /// Error, if the compensation step itself failed.
    pub error: Option<String>,
}

/// One entry of a compensation plan.
pub struct PlannedCompensation {
    /// Name of the original completed step.
    pub compensates: String,
    /// The original step's output snapshot, handed to the compensation
    /// step as its context.
    pub output: Value,
    /// The compensation step to run.
    pub step: Arc<dyn PipelineStep>,
}

struct SagaState {
    status: SagaStatus,
    started_at: Instant,
    completed_at: Option<Instant>,
    steps: Vec<CompletedStep>,
    failed_step: Option<String>,
    failure: Option<String>,
    compensations: Vec<CompensationRecord>,
}

// =============================================================================
// Saga
// =============================================================================

/// One pipeline execution's saga.
///
/// Mutation of a given saga is serialised by its own mutex; distinct sagas
/// advance concurrently without contention.
pub struct Saga {
    id: String,
    pipeline: String,
    config: SagaConfig,
    state: Mutex<SagaState>,
}

impl Saga {
    fn new(id: String, pipeline: String, config: SagaConfig) -> Self {
        Self {
            id,
            pipeline,
            config,
            state: Mutex::new(SagaState {
                status: SagaStatus::Running,
                started_at: Instant::now(),
                completed_at: None,
                steps: Vec::new(),
                failed_step: None,
                failure: None,
                compensations: Vec::new(),
            }),
        }
    }

    /// Saga identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owning pipeline name.
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Saga configuration.
    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Current status.
    pub fn status(&self) -> SagaStatus {
        self.state.lock().status
    }

    fn terminal_guard(&self, state: &SagaState) -> Result<(), ConsistencyError> {
        if state.status.is_terminal() {
            return Err(ConsistencyError::TerminalSaga {
                id: self.id.clone(),
                status: state.status.to_string(),
            });
        }
        Ok(())
    }

    /// Appends a completed-step record.
    pub fn record_step(&self, record: CompletedStep) -> Result<(), ConsistencyError> {
        let mut state = self.state.lock();
        self.terminal_guard(&state)?;
        state.steps.push(record);
        Ok(())
    }

    /// Marks the saga completed.
    pub fn complete(&self) -> Result<(), ConsistencyError> {
        let mut state = self.state.lock();
        self.terminal_guard(&state)?;
        state.status = SagaStatus::Completed;
        state.completed_at = Some(Instant::now());
        Ok(())
    }

    /// Marks the saga failed without compensation.
    pub fn fail(&self, step: &str, reason: &str) -> Result<(), ConsistencyError> {
        let mut state = self.state.lock();
        self.terminal_guard(&state)?;
        state.status = SagaStatus::Failed;
        state.failed_step = Some(step.to_string());
        state.failure = Some(reason.to_string());
        state.completed_at = Some(Instant::now());
        Ok(())
    }

    /// Transitions to `compensating` and returns the compensation plan.
    ///
    /// Records without a registered compensation step are filtered out; the
    /// remainder is ordered per the saga's [`CompensationOrder`].
    pub fn begin_compensation(
        &self,
        failed_step: &str,
        failure: &str,
    ) -> Result<Vec<PlannedCompensation>, ConsistencyError> {
        let mut state = self.state.lock();
        self.terminal_guard(&state)?;
        state.status = SagaStatus::Compensating;
        state.failed_step = Some(failed_step.to_string());
        state.failure = Some(failure.to_string());

        let mut plan: Vec<PlannedCompensation> = state
            .steps
            .iter()
            .filter(|record| record.error.is_none())
            .filter_map(|record| {
                record.compensation.clone().map(|step| PlannedCompensation {
                    compensates: record.name.clone(),
                    output: record.output.clone(),
                    step,
                })
            })
            .collect();
        if self.config.order == CompensationOrder::Reverse {
            plan.reverse();
        }
        debug!(saga = %self.id, steps = plan.len(), "Compensation plan built");
        Ok(plan)
    }

    /// Records the outcome of one compensation step.
    pub fn record_compensation(&self, record: CompensationRecord) {
        self.state.lock().compensations.push(record);
    }

    /// Closes compensation: `compensated` if every compensation step
    /// succeeded, `failed` otherwise.
    pub fn finish_compensation(&self) -> Result<SagaStatus, ConsistencyError> {
        let mut state = self.state.lock();
        if state.status != SagaStatus::Compensating {
            return Err(ConsistencyError::TerminalSaga {
                id: self.id.clone(),
                status: state.status.to_string(),
            });
        }
        let status = if state.compensations.iter().any(|c| c.error.is_some()) {
            SagaStatus::Failed
        } else {
            SagaStatus::Compensated
        };
        state.status = status;
        state.completed_at = Some(Instant::now());
        Ok(status)
    }

    /// Returns whether wall time since start exceeds the configured
    /// timeout.
    pub fn is_timed_out(&self) -> bool {
        match self.config.timeout {
            Some(timeout) if !timeout.is_zero() => {
                self.state.lock().started_at.elapsed() > timeout
            }
            _ => false,
        }
    }

    /// Completed-step records in order.
    pub fn steps(&self) -> Vec<CompletedStep> {
        self.state.lock().steps.clone()
    }

    /// Compensation records in execution order.
    pub fn compensations(&self) -> Vec<CompensationRecord> {
        self.state.lock().compensations.clone()
    }

    /// Name of the step that triggered failure/compensation.
    pub fn failed_step(&self) -> Option<String> {
        self.state.lock().failed_step.clone()
    }

    /// Recorded failure message.
    pub fn failure(&self) -> Option<String> {
        self.state.lock().failure.clone()
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Owns all sagas; retains them after completion for inspection.
pub struct SagaCoordinator {
    sagas: RwLock<HashMap<String, Arc<Saga>>>,
    counter: AtomicU64,
}

impl Default for SagaCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SagaCoordinator {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self {
            sagas: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Creates and registers a new running saga.
    pub fn create(&self, pipeline: &str, config: SagaConfig) -> Arc<Saga> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("saga-{n}");
        let saga = Arc::new(Saga::new(id.clone(), pipeline.to_string(), config));
        self.sagas.write().insert(id, Arc::clone(&saga));
        saga
    }

    /// Returns a saga by id.
    pub fn get(&self, id: &str) -> Result<Arc<Saga>, ConsistencyError> {
        self.sagas
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ConsistencyError::UnknownSaga(id.to_string()))
    }

    /// Returns all saga ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sagas.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of retained sagas.
    pub fn len(&self) -> usize {
        self.sagas.read().len()
    }

    /// Returns whether no sagas are retained.
    pub fn is_empty(&self) -> bool {
        self.sagas.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use weft_core::step::PipelineContext;

    struct NamedStep(&'static str);

    #[async_trait]
    impl PipelineStep for NamedStep {
        fn name(&self) -> &str {
            self.0
        }
        async fn execute(&self, _ctx: &mut PipelineContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn completed(name: &str, compensation: Option<&'static str>) -> CompletedStep {
        CompletedStep {
            name: name.to_string(),
            output: json!({}),
            completed_at: Instant::now(),
            compensation: compensation.map(|n| Arc::new(NamedStep(n)) as Arc<dyn PipelineStep>),
            error: None,
        }
    }

    #[test]
    fn test_compensation_plan_reverse_and_forward() {
        for (order, expected) in [
            (CompensationOrder::Reverse, vec!["c3", "c2", "c1"]),
            (CompensationOrder::Forward, vec!["c1", "c2", "c3"]),
        ] {
            let coordinator = SagaCoordinator::new();
            let saga = coordinator.create("p", SagaConfig { timeout: None, order });
            saga.record_step(completed("s1", Some("c1"))).unwrap();
            saga.record_step(completed("s2", Some("c2"))).unwrap();
            saga.record_step(completed("s3", Some("c3"))).unwrap();

            let plan = saga.begin_compensation("s4", "boom").unwrap();
            let names: Vec<&str> = plan.iter().map(|p| p.step.name()).collect();
            assert_eq!(names, expected);
        }
    }

    #[test]
    fn test_default_order_is_reverse() {
        assert_eq!(SagaConfig::default().order, CompensationOrder::Reverse);
    }

    #[test]
    fn test_plan_filters_records_without_compensation() {
        let coordinator = SagaCoordinator::new();
        let saga = coordinator.create("p", SagaConfig::default());
        saga.record_step(completed("s1", Some("c1"))).unwrap();
        saga.record_step(completed("s2", None)).unwrap();

        let plan = saga.begin_compensation("s3", "boom").unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].compensates, "s1");
    }

    #[test]
    fn test_terminal_saga_rejects_mutation() {
        let coordinator = SagaCoordinator::new();
        let saga = coordinator.create("p", SagaConfig::default());
        saga.complete().unwrap();

        assert!(matches!(
            saga.record_step(completed("late", None)),
            Err(ConsistencyError::TerminalSaga { .. })
        ));
        assert!(matches!(
            saga.complete(),
            Err(ConsistencyError::TerminalSaga { .. })
        ));
    }

    #[test]
    fn test_partial_compensation_ends_failed() {
        let coordinator = SagaCoordinator::new();
        let saga = coordinator.create("p", SagaConfig::default());
        saga.record_step(completed("s1", Some("c1"))).unwrap();
        saga.begin_compensation("s2", "boom").unwrap();

        saga.record_compensation(CompensationRecord {
            step: "c1".into(),
            compensates: "s1".into(),
            error: Some("undo failed".into()),
        });
        assert_eq!(saga.finish_compensation().unwrap(), SagaStatus::Failed);
    }

    #[tokio::test]
    async fn test_timeout_flag() {
        let coordinator = SagaCoordinator::new();
        let saga = coordinator.create(
            "p",
            SagaConfig {
                timeout: Some(Duration::from_millis(10)),
                order: CompensationOrder::Reverse,
            },
        );
        assert!(!saga.is_timed_out());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(saga.is_timed_out());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sagas_reach_correct_terminal_states() {
        let coordinator = Arc::new(SagaCoordinator::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let coordinator = Arc::clone(&coordinator);
            handles.push(tokio::spawn(async move {
                let saga = coordinator.create("p", SagaConfig::default());
                saga.record_step(completed("s1", Some("c1"))).unwrap();
                if i % 2 == 0 {
                    saga.complete().unwrap();
                } else {
                    saga.begin_compensation("s2", "boom").unwrap();
                    saga.record_compensation(CompensationRecord {
                        step: "c1".into(),
                        compensates: "s1".into(),
                        error: None,
                    });
                    saga.finish_compensation().unwrap();
                }
                saga.id().to_string()
            }));
        }

        let mut completed_count = 0;
        let mut compensated_count = 0;
        for handle in handles {
            let id = handle.await.unwrap();
            match coordinator.get(&id).unwrap().status() {
                SagaStatus::Completed => completed_count += 1,
                SagaStatus::Compensated => compensated_count += 1,
                other => panic!("unexpected terminal status: {other}"),
            }
        }
        assert_eq!(coordinator.len(), 32);
        assert_eq!(completed_count, 16);
        assert_eq!(compensated_count, 16);
    }

    #[test]
    fn test_unknown_saga_id() {
        let coordinator = SagaCoordinator::new();
        assert!(matches!(
            coordinator.get("saga-404"),
            Err(ConsistencyError::UnknownSaga(id)) if id == "saga-404"
        ));
    }
}
