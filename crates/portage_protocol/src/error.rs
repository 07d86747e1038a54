//! Error types for the pipeline protocol.

use thiserror::Error;

/// Errors raised while encoding or decoding pipeline payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not a file URL: {0}")]
    NotAFileUrl(String),
}

/// Errors surfaced by a [`StreamClient`](crate::StreamClient).
///
/// `NotFound` on delete and `NotEnoughMessages` on read are expected outcomes
/// for callers, not faults.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream not found: {0}")]
    NotFound(String),

    #[error("stream already exists: {0}")]
    AlreadyExists(String),

    #[error("not enough messages available before the read timeout")]
    NotEnoughMessages,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("client is closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

impl StreamError {
    /// Stable wire tag for the error, used by the socket transport.
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            StreamError::NotFound(_) => StreamErrorKind::NotFound,
            StreamError::AlreadyExists(_) => StreamErrorKind::AlreadyExists,
            StreamError::NotEnoughMessages => StreamErrorKind::NotEnoughMessages,
            StreamError::InvalidRequest(_) => StreamErrorKind::InvalidRequest,
            StreamError::Closed => StreamErrorKind::Closed,
            StreamError::Transport(_) => StreamErrorKind::Transport,
        }
    }

    /// Rebuild an error from its wire tag and message.
    pub fn from_kind(kind: StreamErrorKind, message: String) -> Self {
        match kind {
            StreamErrorKind::NotFound => StreamError::NotFound(message),
            StreamErrorKind::AlreadyExists => StreamError::AlreadyExists(message),
            StreamErrorKind::NotEnoughMessages => StreamError::NotEnoughMessages,
            StreamErrorKind::InvalidRequest => StreamError::InvalidRequest(message),
            StreamErrorKind::Closed => StreamError::Closed,
            StreamErrorKind::Transport => StreamError::Transport(message),
        }
    }
}

/// Serializable discriminant of [`StreamError`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    NotFound,
    AlreadyExists,
    NotEnoughMessages,
    InvalidRequest,
    Closed,
    Transport,
}
