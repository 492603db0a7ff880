//! Configuration tree schema.
//!
//! The declarative document the engine realises. Top-level keys the core
//! recognises are typed here; everything else (`platform`, `httpserver`,
//! `auth`, `database`, `scheduler`, `config`, …) is kept as an opaque
//! section and registered with the host by name.
//!
//! # Example Configuration (YAML)
//!
//! ```yaml
//! modules:
//!   - name: web
//!     type: http.server
//!     config:
//!       port: 8080
//!
//! workflows:
//!   pipeline: {}
//!
//! triggers:
//!   schedule:
//!     interval: 1m
//!     workflow: pipeline:cleanup
//!
//! pipelines:
//!   cleanup:
//!     on_error: skip
//!     steps:
//!       - name: sweep
//!         type: step.log
//!         config: {message: "sweeping"}
//!
//! requires:
//!   capabilities: [http-server]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use weft_core::error::ConfigError;
use weft_core::value::ConfigMap;
use weft_engine::PipelineSpec;

/// One `modules[]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Unique module instance name.
    pub name: String,
    /// Module type tag resolved through the factory table.
    #[serde(rename = "type")]
    pub module_type: String,
    /// Module configuration, opaque to the core.
    #[serde(default)]
    pub config: ConfigMap,
    /// Names of modules this one depends on.
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
}

/// A `requires.plugins[]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequirement {
    /// Plugin name that must be loaded.
    pub name: String,
    /// Minimum acceptable version.
    #[serde(default, rename = "minVersion")]
    pub min_version: Option<String>,
}

/// The `requires` block: hard-fail if unsatisfied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequiresConfig {
    /// Capability names that must have a provider-role declaration.
    pub capabilities: Vec<String>,
    /// Plugins that must be loaded, optionally at a minimum version.
    pub plugins: Vec<PluginRequirement>,
}

/// The `platform` section knobs the core itself reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Deployment name, carried into logs.
    pub name: Option<String>,
    /// Trigger shutdown grace period (duration string, default 5s).
    pub shutdown_grace: Option<String>,
}

/// The parsed declarative document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ordered module instantiations.
    pub modules: Vec<ModuleEntry>,
    /// Workflow type → opaque handler block.
    pub workflows: BTreeMap<String, Value>,
    /// Trigger type → opaque trigger block.
    pub triggers: BTreeMap<String, Value>,
    /// Pipeline name → definition.
    pub pipelines: BTreeMap<String, PipelineSpec>,
    /// Hard requirements checked before anything is built.
    pub requires: RequiresConfig,
    /// Core platform knobs.
    pub platform: PlatformConfig,
    /// Every other top-level section, registered with the host by name.
    #[serde(flatten)]
    pub sections: BTreeMap<String, Value>,
}

impl EngineConfig {
    /// Parses a transformed config tree.
    pub fn from_value(tree: &Value) -> Result<Self, ConfigError> {
        serde_json::from_value(tree.clone())
            .map_err(|e| ConfigError::Validation(format!("configuration does not parse: {e}")))
    }
}
