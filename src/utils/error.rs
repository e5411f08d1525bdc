//! The `error` module defines the error types used across `pulsehub`.
//!
//! `HubError` is the operation-level taxonomy returned by the broker. Every
//! variant carries a stable code that the transport echoes back to clients in
//! error acks, so the codes must not change once published.

use thiserror::Error;

use crate::auth::Action;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("connection not found: {0}")]
    ConnectionNotFound(String),
    #[error("topic has no subscribers: {0}")]
    TopicNotFound(String),
    #[error("permission denied: cannot {action} on {topic}")]
    PermissionDenied { action: Action, topic: String },
    #[error("invalid topic name: {0:?}")]
    InvalidTopic(String),
    #[error("connection already registered: {0}")]
    DuplicateConnection(String),
}

impl HubError {
    /// Stable machine-readable code sent in error acks.
    pub fn code(&self) -> &'static str {
        match self {
            HubError::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            HubError::TopicNotFound(_) => "TOPIC_NOT_FOUND",
            HubError::PermissionDenied { .. } => "PERMISSION_DENIED",
            HubError::InvalidTopic(_) => "INVALID_TOPIC",
            HubError::DuplicateConnection(_) => "DUPLICATE_CONNECTION",
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;

/// Failures raised by a transport while delivering to a single connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing access token")]
    MissingToken,
    #[error("invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode stored message: {0}")]
    Encode(#[from] serde_json::Error),
}
