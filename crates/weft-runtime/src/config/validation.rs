//! Structural validation of the parsed configuration.

use std::collections::HashSet;

use weft_core::error::ConfigError;

use super::schema::{EngineConfig, ModuleEntry};

/// Validates the parsed configuration tree.
pub fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    validate_modules(&config.modules)?;
    for (name, spec) in &config.pipelines {
        for step in &spec.steps {
            if step.name.is_empty() {
                return Err(ConfigError::validation(format!(
                    "pipeline '{name}' has a step with an empty name"
                )));
            }
            if step.step_type.is_empty() {
                return Err(ConfigError::validation(format!(
                    "pipeline '{name}' step '{}' has an empty type",
                    step.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_modules(modules: &[ModuleEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in modules {
        if entry.name.is_empty() {
            return Err(ConfigError::validation("module with an empty name"));
        }
        if entry.module_type.is_empty() {
            return Err(ConfigError::validation(format!(
                "module '{}' has an empty type",
                entry.name
            )));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::DuplicateModuleName(entry.name.clone()));
        }
    }
    // dependsOn must reference declared modules so a typo fails fast
    // instead of silently losing the ordering edge.
    for entry in modules {
        for dep in &entry.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(ConfigError::validation(format!(
                    "module '{}' depends on unknown module '{dep}'",
                    entry.name
                )));
            }
        }
    }
    Ok(())
}
