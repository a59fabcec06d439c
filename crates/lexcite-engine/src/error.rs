use std::path::PathBuf;

use lexcite_ai::AiError;
use lexcite_store::StoreError;
use thiserror::Error;

/// Startup and request-level failures of the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("required configuration missing: {0}")]
    MissingConfig(PathBuf),

    #[error("invalid configuration in {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid record: {0}")]
    Core(#[from] lexcite_core::CoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Why a single signal source contributed nothing.
///
/// Fusion treats every variant as zero contribution; none is fatal.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("{0} not provisioned")]
    Unavailable(&'static str),

    #[error("collaborator failed: {0}")]
    Collaborator(#[from] AiError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
