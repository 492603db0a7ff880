//! Aggregate error type for engine operations.

use thiserror::Error;

use weft_core::error::{ConfigError, ConsistencyError, InitError, RuntimeError};

use crate::loader::LoadError;
use crate::pipeline::PipelineError;

/// Any failure surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration mistake; reported synchronously from the build.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Plugin-load failure.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Initialisation failure; the engine refuses to start.
    #[error(transparent)]
    Init(#[from] InitError),

    /// Runtime dispatch or lifecycle failure.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Pipeline execution failure.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Saga state-machine violation.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
}
