//! Built-in triggers contributed by the core plugin.
//!
//! - `mock` — fired manually; test and development use.
//! - `schedule` — interval ticks dispatching configured workflows.
//! - `event` — in-process channel; the trigger publishes the sender as a
//!   service for application code to push through.
//! - `http`, `eventbus` — bridge triggers consuming an
//!   [`EventSource`] service that an out-of-scope server/broker module
//!   publishes in the registry.
//! - `reconciliation` — periodic resync tick invoking a configured
//!   workflow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use weft_core::host::HostContainer;
use weft_core::trigger::{
    ChannelEventSource, EventSource, Trigger, TriggerContext, TriggerEvent, TriggerFactory,
    WorkflowSink,
};
use weft_core::value::{self, ConfigMap};

// =============================================================================
// Task bookkeeping shared by the long-running triggers
// =============================================================================

#[derive(Default)]
struct TaskSlot {
    token: Mutex<Option<CancellationToken>>,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSlot {
    async fn store(&self, token: CancellationToken, handles: Vec<JoinHandle<()>>) {
        *self.token.lock() = Some(token);
        *self.handles.lock().await = handles;
    }

    async fn stop(&self) {
        if let Some(token) = self.token.lock().take() {
            token.cancel();
        }
        let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
        let _ = future::join_all(handles).await;
    }
}

async fn dispatch(sink: &Arc<dyn WorkflowSink>, event: TriggerEvent) {
    if let Err(e) = sink
        .trigger_workflow(&event.workflow_type, &event.action, event.data)
        .await
    {
        warn!(
            workflow_type = %event.workflow_type,
            action = %event.action,
            error = %e,
            "Trigger dispatch failed"
        );
    }
}

// =============================================================================
// mock
// =============================================================================

#[derive(Default)]
struct MockState {
    configured: Vec<Value>,
    sink: Option<Arc<dyn WorkflowSink>>,
}

/// A trigger fired manually from code.
pub struct MockTrigger {
    name: String,
    state: Mutex<MockState>,
}

impl MockTrigger {
    /// Creates a mock trigger answering to `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Number of times `configure` was invoked.
    pub fn configure_count(&self) -> usize {
        self.state.lock().configured.len()
    }

    /// The blocks `configure` received, in order.
    pub fn configured_with(&self) -> Vec<Value> {
        self.state.lock().configured.clone()
    }

    /// Fires an event into the engine, as a real source would.
    pub async fn fire(
        &self,
        workflow_type: &str,
        action: &str,
        data: Value,
    ) -> anyhow::Result<Value> {
        let sink = self
            .state
            .lock()
            .sink
            .clone()
            .ok_or_else(|| anyhow::anyhow!("mock trigger '{}' is not started", self.name))?;
        sink.trigger_workflow(workflow_type, action, data).await
    }
}

#[async_trait]
impl Trigger for MockTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure(&self, _host: &dyn HostContainer, block: &Value) -> anyhow::Result<()> {
        self.state.lock().configured.push(block.clone());
        Ok(())
    }

    async fn start(&self, ctx: TriggerContext) -> anyhow::Result<()> {
        self.state.lock().sink = Some(ctx.engine);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.state.lock().sink = None;
        Ok(())
    }
}

/// Factory for the `mock` trigger type.
pub fn mock_factory() -> TriggerFactory {
    Arc::new(|name, _config| Ok(Arc::new(MockTrigger::new(name)) as Arc<dyn Trigger>))
}

// =============================================================================
// schedule
// =============================================================================

#[derive(Clone)]
struct ScheduledJob {
    interval: Duration,
    workflow_type: String,
    action: String,
    data: Value,
}

fn parse_job(map: &ConfigMap) -> anyhow::Result<ScheduledJob> {
    let interval = value::get_duration(map, "interval")
        .ok_or_else(|| anyhow::anyhow!("schedule job is missing a valid 'interval'"))?;
    let workflow_type = value::get_str(map, "workflow")
        .ok_or_else(|| anyhow::anyhow!("schedule job is missing 'workflow'"))?
        .to_string();
    Ok(ScheduledJob {
        interval,
        workflow_type,
        action: value::get_str_or(map, "action", "").to_string(),
        data: map.get("data").cloned().unwrap_or_else(|| json!({})),
    })
}

/// Dispatches configured workflows on fixed intervals.
pub struct ScheduleTrigger {
    name: String,
    jobs: Mutex<Vec<ScheduledJob>>,
    tasks: TaskSlot,
}

impl ScheduleTrigger {
    /// Creates a schedule trigger answering to `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Mutex::new(Vec::new()),
            tasks: TaskSlot::default(),
        }
    }

    /// Number of configured jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }
}

#[async_trait]
impl Trigger for ScheduleTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    /// Accepts either a single job block or `{jobs: [..]}`. Repeated
    /// configuration appends, so pipeline-synthesised entries compose with
    /// the user's own.
    async fn configure(&self, _host: &dyn HostContainer, block: &Value) -> anyhow::Result<()> {
        let map = value::as_config_map(block);
        let mut parsed = Vec::new();
        if let Some(jobs) = map.get("jobs").and_then(Value::as_array) {
            for job in jobs {
                parsed.push(parse_job(&value::as_config_map(job))?);
            }
        } else if !map.is_empty() {
            parsed.push(parse_job(&map)?);
        }
        self.jobs.lock().extend(parsed);
        Ok(())
    }

    async fn start(&self, ctx: TriggerContext) -> anyhow::Result<()> {
        let token = ctx.cancel.child_token();
        let jobs = self.jobs.lock().clone();
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let token = token.clone();
            let sink = Arc::clone(&ctx.engine);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(job.interval);
                // The first tick completes immediately; a schedule fires
                // after its interval.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        _ = ticker.tick() => {
                            dispatch(
                                &sink,
                                TriggerEvent::new(
                                    job.workflow_type.clone(),
                                    job.action.clone(),
                                    job.data.clone(),
                                ),
                            )
                            .await;
                        }
                    }
                }
            }));
        }

        debug!(trigger = %self.name, jobs = handles.len(), "Schedule started");
        self.tasks.store(token, handles).await;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.tasks.stop().await;
        Ok(())
    }
}

/// Factory for the `schedule` trigger type.
pub fn schedule_factory() -> TriggerFactory {
    Arc::new(|name, _config| Ok(Arc::new(ScheduleTrigger::new(name)) as Arc<dyn Trigger>))
}

// =============================================================================
// event
// =============================================================================

/// In-process channel trigger.
///
/// At configure time it publishes an `mpsc::Sender<TriggerEvent>` service
/// (key from the block's `publish_as`, default `<name>.publisher`) for
/// application modules to push events through.
pub struct EventTrigger {
    name: String,
    buffer: usize,
    source: Mutex<Option<Arc<ChannelEventSource>>>,
    tasks: TaskSlot,
}

impl EventTrigger {
    /// Creates an event trigger answering to `name`.
    pub fn new(name: impl Into<String>, buffer: usize) -> Self {
        Self {
            name: name.into(),
            buffer,
            source: Mutex::new(None),
            tasks: TaskSlot::default(),
        }
    }
}

#[async_trait]
impl Trigger for EventTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure(&self, host: &dyn HostContainer, block: &Value) -> anyhow::Result<()> {
        let map = value::as_config_map(block);
        let default_key = format!("{}.publisher", self.name);
        let key = value::get_str_or(&map, "publish_as", &default_key);

        let (tx, source) = ChannelEventSource::channel(self.buffer);
        host.register_service(key, Arc::new(tx));
        *self.source.lock() = Some(source);
        Ok(())
    }

    async fn start(&self, ctx: TriggerContext) -> anyhow::Result<()> {
        let Some(source) = self.source.lock().clone() else {
            // Not configured; nothing to pump.
            return Ok(());
        };
        let token = ctx.cancel.child_token();
        let sink = Arc::clone(&ctx.engine);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    event = source.recv() => match event {
                        Some(event) => dispatch(&sink, event).await,
                        None => break,
                    },
                }
            }
        });
        self.tasks.store(token, vec![handle]).await;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.tasks.stop().await;
        Ok(())
    }
}

/// Factory for the `event` trigger type.
pub fn event_factory() -> TriggerFactory {
    Arc::new(|name, config| {
        let buffer = value::get_u64(config, "buffer").unwrap_or(64) as usize;
        Ok(Arc::new(EventTrigger::new(name, buffer)) as Arc<dyn Trigger>)
    })
}

// =============================================================================
// http / eventbus bridges
// =============================================================================

/// Consumes an [`EventSource`] service published by another module.
///
/// The `http` and `eventbus` trigger types are both bridges: the actual
/// listener or broker connection lives in a module, which resolves inbound
/// traffic into [`TriggerEvent`]s and registers the source under a
/// well-known key (`<name>.events` unless overridden by the block's
/// `source`).
pub struct BridgeTrigger {
    name: String,
    source: Mutex<Option<Arc<dyn EventSource>>>,
    tasks: TaskSlot,
}

impl BridgeTrigger {
    /// Creates a bridge trigger answering to `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Mutex::new(None),
            tasks: TaskSlot::default(),
        }
    }
}

#[async_trait]
impl Trigger for BridgeTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure(&self, host: &dyn HostContainer, block: &Value) -> anyhow::Result<()> {
        let map = value::as_config_map(block);
        let default_key = format!("{}.events", self.name);
        let key = value::get_str_or(&map, "source", &default_key);

        let source = host
            .services()
            .get_as::<Arc<dyn EventSource>>(key)
            .ok_or_else(|| {
                anyhow::anyhow!("trigger '{}': event source service '{key}' not found", self.name)
            })?;
        *self.source.lock() = Some(Arc::clone(source.as_ref()));
        Ok(())
    }

    async fn start(&self, ctx: TriggerContext) -> anyhow::Result<()> {
        let Some(source) = self.source.lock().clone() else {
            return Ok(());
        };
        let token = ctx.cancel.child_token();
        let sink = Arc::clone(&ctx.engine);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    event = source.recv() => match event {
                        Some(event) => dispatch(&sink, event).await,
                        None => break,
                    },
                }
            }
        });
        self.tasks.store(token, vec![handle]).await;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.tasks.stop().await;
        Ok(())
    }
}

/// Factory for the `http` trigger type.
pub fn http_factory() -> TriggerFactory {
    Arc::new(|name, _config| Ok(Arc::new(BridgeTrigger::new(name)) as Arc<dyn Trigger>))
}

/// Factory for the `eventbus` trigger type.
pub fn eventbus_factory() -> TriggerFactory {
    Arc::new(|name, _config| Ok(Arc::new(BridgeTrigger::new(name)) as Arc<dyn Trigger>))
}

// =============================================================================
// reconciliation
// =============================================================================

/// Periodic resync tick invoking a configured workflow.
///
/// Inactive until configured.
pub struct ReconciliationTrigger {
    name: String,
    settings: Mutex<Option<ScheduledJob>>,
    tasks: TaskSlot,
}

impl ReconciliationTrigger {
    /// Creates a reconciliation trigger answering to `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Mutex::new(None),
            tasks: TaskSlot::default(),
        }
    }
}

#[async_trait]
impl Trigger for ReconciliationTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure(&self, _host: &dyn HostContainer, block: &Value) -> anyhow::Result<()> {
        let map = value::as_config_map(block);
        let mut settings = self.settings.lock();
        let job = settings.get_or_insert_with(|| ScheduledJob {
            interval: Duration::from_secs(30),
            workflow_type: "reconciliation".to_string(),
            action: "reconcile".to_string(),
            data: json!({}),
        });
        if let Some(interval) = value::get_duration(&map, "interval") {
            job.interval = interval;
        }
        if let Some(workflow) = value::get_str(&map, "workflow") {
            job.workflow_type = workflow.to_string();
        }
        if let Some(action) = value::get_str(&map, "action") {
            job.action = action.to_string();
        }
        Ok(())
    }

    async fn start(&self, ctx: TriggerContext) -> anyhow::Result<()> {
        let Some(settings) = self.settings.lock().clone() else {
            return Ok(());
        };
        let token = ctx.cancel.child_token();
        let sink = Arc::clone(&ctx.engine);
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(settings.interval);
            ticker.tick().await;
            let mut tick: u64 = 0;
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        tick += 1;
                        dispatch(
                            &sink,
                            TriggerEvent::new(
                                settings.workflow_type.clone(),
                                settings.action.clone(),
                                json!({"tick": tick}),
                            ),
                        )
                        .await;
                    }
                }
            }
        });
        self.tasks.store(token, vec![handle]).await;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.tasks.stop().await;
        Ok(())
    }
}

/// Factory for the `reconciliation` trigger type.
pub fn reconciliation_factory() -> TriggerFactory {
    Arc::new(|name, _config| Ok(Arc::new(ReconciliationTrigger::new(name)) as Arc<dyn Trigger>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHost;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct RecordingSink {
        tx: mpsc::UnboundedSender<TriggerEvent>,
    }

    #[async_trait]
    impl WorkflowSink for RecordingSink {
        async fn trigger_workflow(
            &self,
            workflow_type: &str,
            action: &str,
            data: Value,
        ) -> anyhow::Result<Value> {
            let _ = self
                .tx
                .send(TriggerEvent::new(workflow_type, action, data));
            Ok(Value::Null)
        }
    }

    fn recording_ctx() -> (TriggerContext, mpsc::UnboundedReceiver<TriggerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = TriggerContext {
            cancel: CancellationToken::new(),
            engine: Arc::new(RecordingSink { tx }),
        };
        (ctx, rx)
    }

    #[tokio::test]
    async fn test_mock_trigger_records_configuration_and_fires() {
        let host = TestHost::new();
        let trigger = MockTrigger::new("mock");
        trigger
            .configure(host.as_ref(), &json!({"only": true}))
            .await
            .unwrap();
        assert_eq!(trigger.configure_count(), 1);

        assert!(trigger.fire("pipeline", "x", json!({})).await.is_err());

        let (ctx, mut rx) = recording_ctx();
        trigger.start(ctx).await.unwrap();
        trigger
            .fire("pipeline:api-pipeline", "", json!({"k": 1}))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.workflow_type, "pipeline:api-pipeline");
        assert_eq!(event.data, json!({"k": 1}));
    }

    #[tokio::test]
    async fn test_schedule_trigger_ticks() {
        let host = TestHost::new();
        let trigger = ScheduleTrigger::new("schedule");
        trigger
            .configure(
                host.as_ref(),
                &json!({"interval": "10ms", "workflow": "pipeline:tick", "data": {"n": 1}}),
            )
            .await
            .unwrap();
        assert_eq!(trigger.job_count(), 1);

        let (ctx, mut rx) = recording_ctx();
        trigger.start(ctx).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.workflow_type, "pipeline:tick");
        trigger.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_event_trigger_publishes_sender() {
        let host = TestHost::new();
        let trigger = EventTrigger::new("event", 8);
        trigger
            .configure(host.as_ref(), &json!({}))
            .await
            .unwrap();

        let publisher = host
            .services()
            .get_as::<mpsc::Sender<TriggerEvent>>("event.publisher")
            .unwrap();

        let (ctx, mut rx) = recording_ctx();
        trigger.start(ctx).await.unwrap();
        publisher
            .send(TriggerEvent::new("pipeline:p", "", json!({})))
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.workflow_type, "pipeline:p");
        trigger.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bridge_trigger_requires_source_service() {
        let host = TestHost::new();
        let trigger = BridgeTrigger::new("http");
        let err = trigger
            .configure(host.as_ref(), &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("http.events"));

        // With the source registered the bridge pumps events through.
        let (tx, source) = ChannelEventSource::channel(8);
        let source: Arc<dyn EventSource> = source;
        host.register_service("http.events", Arc::new(source));
        trigger
            .configure(host.as_ref(), &json!({}))
            .await
            .unwrap();

        let (ctx, mut rx) = recording_ctx();
        trigger.start(ctx).await.unwrap();
        tx.send(TriggerEvent::new("pipeline:api", "", json!({})))
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.workflow_type, "pipeline:api");
        trigger.stop().await.unwrap();
    }
}
