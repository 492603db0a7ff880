//! Built-in pipeline steps contributed by the core plugin.
//!
//! Each factory is a pure constructor over `(name, config map)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use weft_core::step::{PipelineContext, PipelineStep, StepFactory};
use weft_core::value::{self, ConfigMap};

// =============================================================================
// step.set
// =============================================================================

/// Writes configured values into the context.
pub struct SetStep {
    name: String,
    values: ConfigMap,
}

#[async_trait]
impl PipelineStep for SetStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
        for (key, v) in &self.values {
            ctx.set(key.clone(), v.clone());
        }
        Ok(())
    }
}

/// Factory for `step.set`. Config: `{values: {key: value, …}}`.
pub fn set_factory() -> StepFactory {
    Arc::new(|name, config| {
        let values = value::get_map(config, "values").cloned().unwrap_or_default();
        Ok(Arc::new(SetStep {
            name: name.to_string(),
            values,
        }) as Arc<dyn PipelineStep>)
    })
}

// =============================================================================
// step.validate
// =============================================================================

enum ValidationStrategy {
    RequiredFields,
    NonEmpty,
}

/// Checks the context against a validation strategy.
pub struct ValidateStep {
    name: String,
    strategy: ValidationStrategy,
    required_fields: Vec<String>,
}

#[async_trait]
impl PipelineStep for ValidateStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
        for field in &self.required_fields {
            let present = match (&self.strategy, ctx.get(field)) {
                (_, None) => false,
                (ValidationStrategy::RequiredFields, Some(_)) => true,
                (ValidationStrategy::NonEmpty, Some(v)) => match v {
                    Value::Null => false,
                    Value::String(s) => !s.is_empty(),
                    Value::Array(a) => !a.is_empty(),
                    Value::Object(m) => !m.is_empty(),
                    _ => true,
                },
            };
            anyhow::ensure!(
                present,
                "validation failed: missing required field '{field}'"
            );
        }
        Ok(())
    }
}

/// Factory for `step.validate`. Config:
/// `{strategy: "required_fields" | "non_empty", required_fields: [..]}`.
pub fn validate_factory() -> StepFactory {
    Arc::new(|name, config| {
        let strategy = match value::get_str_or(config, "strategy", "required_fields") {
            "non_empty" => ValidationStrategy::NonEmpty,
            "required_fields" => ValidationStrategy::RequiredFields,
            other => anyhow::bail!("step '{name}': unknown validation strategy '{other}'"),
        };
        Ok(Arc::new(ValidateStep {
            name: name.to_string(),
            strategy,
            required_fields: value::get_str_list(config, "required_fields"),
        }) as Arc<dyn PipelineStep>)
    })
}

// =============================================================================
// step.log
// =============================================================================

/// Logs a message plus the current context keys.
pub struct LogStep {
    name: String,
    message: String,
    warn: bool,
}

#[async_trait]
impl PipelineStep for LogStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
        let keys = ctx.keys();
        if self.warn {
            warn!(step = %self.name, keys = ?keys, "{}", self.message);
        } else {
            info!(step = %self.name, keys = ?keys, "{}", self.message);
        }
        Ok(())
    }
}

/// Factory for `step.log`. Config: `{message: "...", level: "info"|"warn"}`.
pub fn log_factory() -> StepFactory {
    Arc::new(|name, config| {
        Ok(Arc::new(LogStep {
            name: name.to_string(),
            message: value::get_str_or(config, "message", "").to_string(),
            warn: value::get_str_or(config, "level", "info") == "warn",
        }) as Arc<dyn PipelineStep>)
    })
}

// =============================================================================
// step.delay
// =============================================================================

/// Sleeps for a configured duration, observing cancellation.
pub struct DelayStep {
    name: String,
    duration: Duration,
}

#[async_trait]
impl PipelineStep for DelayStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
        tokio::select! {
            () = tokio::time::sleep(self.duration) => Ok(()),
            () = ctx.cancellation().cancelled() => {
                anyhow::bail!("step '{}' cancelled", self.name)
            }
        }
    }
}

/// Factory for `step.delay`. Config: `{duration: "100ms"}`.
pub fn delay_factory() -> StepFactory {
    Arc::new(|name, config| {
        let duration = value::get_duration(config, "duration")
            .ok_or_else(|| anyhow::anyhow!("step '{name}': missing or invalid 'duration'"))?;
        Ok(Arc::new(DelayStep {
            name: name.to_string(),
            duration,
        }) as Arc<dyn PipelineStep>)
    })
}

// =============================================================================
// step.transform
// =============================================================================

/// Renames, copies and removes context keys.
pub struct TransformStep {
    name: String,
    rename: ConfigMap,
    copy: ConfigMap,
    remove: Vec<String>,
}

#[async_trait]
impl PipelineStep for TransformStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> anyhow::Result<()> {
        for (from, to) in &self.rename {
            if let (Some(v), Some(to)) = (ctx.remove(from), to.as_str()) {
                ctx.set(to.to_string(), v);
            }
        }
        for (from, to) in &self.copy {
            if let (Some(v), Some(to)) = (ctx.get(from).cloned(), to.as_str()) {
                ctx.set(to.to_string(), v);
            }
        }
        for key in &self.remove {
            ctx.remove(key);
        }
        Ok(())
    }
}

/// Factory for `step.transform`. Config:
/// `{rename: {from: to}, copy: {from: to}, remove: [..]}`.
pub fn transform_factory() -> StepFactory {
    Arc::new(|name, config| {
        Ok(Arc::new(TransformStep {
            name: name.to_string(),
            rename: value::get_map(config, "rename").cloned().unwrap_or_default(),
            copy: value::get_map(config, "copy").cloned().unwrap_or_default(),
            remove: value::get_str_list(config, "remove"),
        }) as Arc<dyn PipelineStep>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn config(v: Value) -> ConfigMap {
        v.as_object().unwrap().clone()
    }

    fn ctx(data: Value) -> PipelineContext {
        PipelineContext::new(data, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_set_writes_values() {
        let step = set_factory()("assign", &config(json!({"values": {"message": "hello"}}))).unwrap();
        let mut ctx = ctx(json!({}));
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.get("message"), Some(&json!("hello")));
    }

    #[tokio::test]
    async fn test_validate_required_fields() {
        let step = validate_factory()(
            "check",
            &config(json!({"strategy": "required_fields", "required_fields": ["name"]})),
        )
        .unwrap();

        let mut ok = ctx(json!({"name": "Test"}));
        step.execute(&mut ok).await.unwrap();

        let mut missing = ctx(json!({}));
        let err = step.execute(&mut missing).await.unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[tokio::test]
    async fn test_validate_non_empty() {
        let step = validate_factory()(
            "check",
            &config(json!({"strategy": "non_empty", "required_fields": ["items"]})),
        )
        .unwrap();

        let mut empty = ctx(json!({"items": []}));
        assert!(step.execute(&mut empty).await.is_err());

        let mut full = ctx(json!({"items": [1]}));
        step.execute(&mut full).await.unwrap();
    }

    #[tokio::test]
    async fn test_delay_observes_cancellation() {
        let step = delay_factory()("wait", &config(json!({"duration": "10s"}))).unwrap();
        let cancel = CancellationToken::new();
        let mut ctx = PipelineContext::new(json!({}), cancel.clone());
        cancel.cancel();
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_transform_rename_and_remove() {
        let step = transform_factory()(
            "shape",
            &config(json!({"rename": {"a": "b"}, "remove": ["junk"]})),
        )
        .unwrap();
        let mut ctx = ctx(json!({"a": 1, "junk": true}));
        step.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.get("b"), Some(&json!(1)));
        assert!(!ctx.contains("a"));
        assert!(!ctx.contains("junk"));
    }
}
