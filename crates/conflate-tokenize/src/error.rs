use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenizeError {
    #[error("unknown token language: {0}")]
    UnknownLanguage(String),

    #[error("invalid token table: {0}")]
    InvalidTable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TokenizeResult<T> = Result<T, TokenizeError>;
