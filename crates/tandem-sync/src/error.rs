//! Error types for the sync module.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::hooks::{HookError, HookKind};
use crate::messages::error_kind;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Incoming message violated the shape for its kind.
    ///
    /// Carries the original message text.
    #[error("wrong message format: {0}")]
    WrongFormat(String),

    /// Incoming message kind is not known to this engine.
    #[error("unknown message: {0}")]
    UnknownMessage(String),

    /// Protocol version mismatch with peer.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    WrongProtocol { local: u32, peer: u32 },

    /// A user hook failed.
    #[error("{hook} hook failed: {source}")]
    Hook {
        hook: HookKind,
        #[source]
        source: HookError,
    },

    /// Log operation failed.
    #[error("store error: {0}")]
    Store(#[from] tandem_store::StoreError),

    /// Connection-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Peer sent an error message.
    #[error("peer error ({kind}): {details}")]
    Peer { kind: String, details: Value },

    /// Peer did not answer a ping in time.
    #[error("timeout: no pong within {0:?}")]
    Timeout(Duration),

    /// The engine has shut down.
    #[error("sync engine closed")]
    Closed,
}

impl SyncError {
    /// Wire name of the `error` message sent for this failure.
    ///
    /// `None` for failures that never tear down the connection.
    pub fn wire_kind(&self) -> Option<&'static str> {
        match self {
            SyncError::WrongFormat(_) => Some(error_kind::WRONG_FORMAT),
            SyncError::UnknownMessage(_) => Some(error_kind::UNKNOWN_MESSAGE),
            SyncError::WrongProtocol { .. } => Some(error_kind::WRONG_PROTOCOL),
            SyncError::Timeout(_) => Some(error_kind::TIMEOUT),
            _ => None,
        }
    }

    /// Whether this failure ends the current connection.
    pub fn is_fatal(&self) -> bool {
        self.wire_kind().is_some()
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
