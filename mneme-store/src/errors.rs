use std::path::PathBuf;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not determine a data directory for this platform")]
    MissingDataDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("sqlite-vec error: {0}")]
    SqliteVec(String),

    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("serialize error: {0}")]
    Serialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store is busy: {0}")]
    Busy(String),

    #[error("corrupt state in {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("{failed} of {attempted} documents failed to index")]
    PartialFailure { failed: usize, attempted: usize },

    #[error("embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimMismatch { expected: usize, actual: usize },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid store state: {0}")]
    State(String),
}
