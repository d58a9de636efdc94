//! The `error` module defines the error types used within `courier`.
//!
//! Only [`ClientError`] ever reaches a caller. The other kinds are produced by
//! the pipeline's collaborators and are absorbed at the sender/receiver loop
//! boundary, where they are logged and turned into "retry later".

use thiserror::Error;

/// Errors surfaced to callers of the public client API.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Bad caller input or inconsistent settings.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The offline store could not be opened.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Failures reported by a [`crate::transport::Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The call did not finish within its timeout.
    #[error("request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Failures reported by a [`crate::persistence::OfflineStore`].
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure for stores other than sled.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Returned by an inbound handler that rejects a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler rejected message: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
