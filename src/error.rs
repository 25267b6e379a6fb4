//! Error types for the session and binding engines

use thiserror::Error;

use crate::bindings::BindingKind;
use crate::fixable::{FixableId, FixableKind};

/// Failure to encode or decode a wire message
#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Failure of the underlying connection
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("connection closed")]
    Closed,
}

/// Rejected binding request
#[derive(Debug, Error, PartialEq)]
pub enum BindingError {
    #[error("unknown fixable '{0}'")]
    UnknownFixable(FixableId),
    #[error("fixable '{id}' of kind {kind} cannot be bound to a controller")]
    Unbindable { id: FixableId, kind: FixableKind },
    #[error("{binding} binding does not fit fixable '{id}' of kind {kind}")]
    KindMismatch {
        id: FixableId,
        kind: FixableKind,
        binding: BindingKind,
    },
}

/// Failure to store or load persisted values
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no session has started yet")]
    NoSession,
    #[error("no value store configured")]
    Unavailable,
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to (de)serialize stored values: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Errors surfaced through the session handle
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session actor is no longer running")]
    ActorGone,
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
