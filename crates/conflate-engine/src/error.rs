use conflate_store::StoreError;
use conflate_tokenize::TokenizeError;
use conflate_types::TypeError;
use thiserror::Error;

/// A single input line that cannot be turned into a record.
///
/// Recovered inside the worker: the line is logged, reported and skipped.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("line is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("malformed JSON: {0}")]
    Parse(String),

    #[error("invalid record: {0}")]
    Invalid(#[from] TypeError),

    #[error("mapping failed: {0}")]
    Mapping(String),
}

/// Errors that end a conflation run.
#[derive(Debug, Error)]
pub enum ConflateError {
    /// Only surfaced by helpers; workers recover these per line.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Broken channel to or from a worker, or a worker that died.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid job configuration, raised before any worker is spawned.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TokenizeError> for ConflateError {
    fn from(e: TokenizeError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type ConflateResult<T> = Result<T, ConflateError>;
