//! Configuration loading, schema and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigLoadError, ConfigLoadResult};
pub use loader::ConfigLoader;
pub use schema::{EngineConfig, ModuleEntry, PlatformConfig, PluginRequirement, RequiresConfig};
pub use validation::validate_config;
