use thiserror::Error;

/// Errors produced while decoding or validating records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("missing required property: {0}")]
    MissingProperty(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),
}
