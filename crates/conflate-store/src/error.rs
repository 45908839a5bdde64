use thiserror::Error;

/// Errors from persistent or staging store operations.
///
/// Any of these is fatal to the run that hit it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite backend reported a failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored row violates the expected schema.
    #[error("corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    /// A blocking store task was cancelled or panicked.
    #[error("store task failed: {0}")]
    Task(String),

    /// The connection pool was shut down.
    #[error("connection pool closed")]
    PoolClosed,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
