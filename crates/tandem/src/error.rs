//! Error types for Tandem nodes.

use tandem_core::ValidationError;
use tandem_store::StoreError;
use tandem_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum TandemError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, TandemError>;
