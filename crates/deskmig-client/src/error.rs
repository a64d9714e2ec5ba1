//! Client error types.

use thiserror::Error;

/// Failure of a single transport round trip.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The connection failed.
    #[error("connection error: {0}")]
    Connection(String),
}

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Retry budget exhausted on timeouts, connection errors, server errors
    /// or rate limiting.
    #[error("{method} {path} failed after {attempts} attempt(s): {reason}")]
    Transient {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// Attempts made.
        attempts: u32,
        /// Last failure seen.
        reason: String,
    },

    /// The server rejected the request (4xx other than rate limiting).
    #[error("{method} {path} rejected with status {status}: {body}")]
    Permanent {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// Response status.
        status: u16,
        /// Response body.
        body: String,
    },

    /// A shutdown signal ended a retry or rate-limit wait.
    #[error("{method} {path} cancelled while waiting to resubmit")]
    Cancelled {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
    },

    /// A collection read failed part way.
    #[error("fetch of {endpoint} failed after cursor {last_cursor:?}: {source}")]
    Fetch {
        /// Collection endpoint.
        endpoint: String,
        /// Cursor of the last page read successfully, `None` if no page was.
        last_cursor: Option<String>,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] deskmig_proto::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Response status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Permanent { status, .. } => Some(*status),
            Error::Fetch { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether the server reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the retry budget was exhausted.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient { .. } => true,
            Error::Fetch { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether a shutdown signal stopped the request.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::Fetch { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Body of a rejected request.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::Permanent { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permanent(status: u16) -> Error {
        Error::Permanent {
            method: "DELETE".into(),
            path: "ticket_fields/1.json".into(),
            status,
            body: "{}".into(),
        }
    }

    #[test]
    fn test_not_found() {
        assert!(permanent(404).is_not_found());
        assert!(!permanent(422).is_not_found());
        assert!(!permanent(422).is_transient());
    }

    #[test]
    fn test_fetch_error_display_carries_cursor() {
        let err = Error::Fetch {
            endpoint: "ticket_fields".into(),
            last_cursor: Some("abc".into()),
            source: Box::new(Error::Transient {
                method: "GET".into(),
                path: "ticket_fields.json".into(),
                attempts: 5,
                reason: "request timed out".into(),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("ticket_fields"));
        assert!(text.contains("abc"));
        assert!(err.is_transient());
    }
}
