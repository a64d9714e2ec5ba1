//! Model and wire-format error types.

use thiserror::Error;

/// Errors raised while decoding remote payloads or model values.
#[derive(Debug, Error)]
pub enum Error {
    /// A response body could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A response envelope did not contain the expected collection or object.
    #[error("invalid message: missing `{0}`")]
    MissingKey(String),

    /// An entity kind string was not recognized.
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}
