//! Error types for the food API client.
//!
//! # Design
//! `ApiError` carries the detail of a single failed call. `ErrorKind` is the
//! coarse category reported on the diagnostic channel, so callers can react
//! to "no session" differently from "server unreachable" without matching on
//! message text.

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedUrl,
    Serialization,
    Transport,
    Decode,
    Http,
    Precondition,
    Cancelled,
}

/// Errors returned by the request builder, the codec and `ApiClient`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request path could not be parsed as an absolute URL.
    #[error("malformed URL {url}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Connection, DNS or timeout failure before a response arrived.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body did not match the expected JSON shape.
    #[error("deserialization failed: {0}")]
    Decode(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The operation requires a session token and none is set.
    #[error("session token is not set")]
    MissingSession,

    /// A caller-supplied value violates a domain invariant.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The client was shut down while the call was in flight.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::MalformedUrl { .. } => ErrorKind::MalformedUrl,
            ApiError::Serialization(_) => ErrorKind::Serialization,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Decode(_) => ErrorKind::Decode,
            ApiError::Http { .. } => ErrorKind::Http,
            ApiError::MissingSession | ApiError::InvalidInput(_) => ErrorKind::Precondition,
            ApiError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
