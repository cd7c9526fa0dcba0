//! Error types for the store, the mutation coordinator and configuration.

use std::path::PathBuf;

use thiserror::Error;

use corkboard_types::BatchError;

/// Errors returned by a [`Store`](crate::store::Store).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The block does not exist.
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// The board does not exist.
    #[error("board not found: {0}")]
    BoardNotFound(String),

    /// An entity with this id already exists.
    #[error("already exists: {0}")]
    Conflict(String),

    /// The batch cannot be applied as given.
    #[error("invalid batch: {0}")]
    Invalid(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned to callers of the mutation coordinator.
///
/// Only the synchronous phase can fail. Once the store mutation succeeds the
/// call succeeds; fan-out problems are logged, never returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Prior state could not be fetched; nothing was mutated.
    #[error("not found: {0}")]
    NotFound(StoreError),

    /// The store rejected the mutation; nothing was mutated.
    #[error("mutation failed: {0}")]
    Mutation(StoreError),

    /// The batch was rejected before reaching the store.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
}

impl From<BatchError> for CoordinatorError {
    fn from(err: BatchError) -> Self {
        Self::InvalidBatch(err.to_string())
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
