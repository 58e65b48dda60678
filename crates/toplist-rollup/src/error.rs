//! Error types for rollup jobs.

use thiserror::Error;
use toplist_storage::StorageError;

use crate::pipeline::PipelineState;

/// Errors that can end a rollup job
#[derive(Error, Debug)]
pub enum RollupError {
    /// Required job argument missing or empty
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Invalid rollup settings
    #[error("Config error: {0}")]
    Config(String),

    /// Store operation failed
    #[error("Store error: {0}")]
    Store(String),

    /// Reading source documents failed
    #[error("Cursor error on {collection}: {message}")]
    Cursor { collection: String, message: String },

    /// Writing a batch failed with continue-on-error disabled
    #[error("Sink error on {collection}: {message}")]
    Sink { collection: String, message: String },

    /// Background task panicked or was cancelled
    #[error("Worker error: {0}")]
    Worker(String),

    /// Pipeline state machine misuse
    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },
}

impl From<StorageError> for RollupError {
    fn from(err: StorageError) -> Self {
        RollupError::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for RollupError {
    fn from(err: tokio::task::JoinError) -> Self {
        RollupError::Worker(err.to_string())
    }
}
