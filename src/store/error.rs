//! Error type for the durable store.

use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failures raised by the persistent store.
///
/// Misses are never errors; they come back as `None`.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("failed to open store at {path}: {source}")]
  Open {
    path: String,
    #[source]
    source: rusqlite::Error,
  },

  #[error("store used before initialize()")]
  NotInitialized,

  #[error("unknown partition '{0}'")]
  UnknownPartition(String),

  #[error("partition '{partition}' has no index '{index}'")]
  UnknownIndex { partition: String, index: String },

  #[error("record for partition '{partition}' is missing its '{field}' key")]
  MissingKey { partition: String, field: String },

  #[error("store transaction failed: {0}")]
  Transaction(#[from] rusqlite::Error),

  #[error("failed to encode record: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("failed to prepare store directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("store lock poisoned")]
  Poisoned,
}
