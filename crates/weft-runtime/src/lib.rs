//! # Weft Runtime
//!
//! The realisation layer of the Weft workflow engine:
//!
//! - [`WorkflowEngine`] — the build orchestrator: plugins in, running
//!   composition out (`build_from_config` → `start` → `stop`)
//! - [`InProcessHost`] — the default module container, with
//!   dependency-ordered init derived from module declarations
//! - [`config`] — the declarative document: schema, YAML loading with
//!   environment expansion, structural validation
//! - [`logging`] — `tracing` setup shared by engine binaries
//!
//! ```ignore
//! use weft_runtime::{ConfigLoader, WorkflowEngine, logging};
//! use weft_engine::CorePlugin;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     logging::init();
//!
//!     let engine = WorkflowEngine::new();
//!     engine.load_plugin(&CorePlugin)?;
//!
//!     let tree = ConfigLoader::default().load()?;
//!     engine.build_from_config(tree).await?;
//!
//!     let lifetime = CancellationToken::new();
//!     engine.start(lifetime.clone()).await?;
//!     tokio::signal::ctrl_c().await?;
//!     lifetime.cancel();
//!     engine.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod host;
pub mod logging;

pub use config::{
    ConfigLoadError, ConfigLoadResult, ConfigLoader, EngineConfig, ModuleEntry, PlatformConfig,
    PluginRequirement, RequiresConfig, validate_config,
};
pub use engine::WorkflowEngine;
pub use host::InProcessHost;
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by engine binaries.
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
