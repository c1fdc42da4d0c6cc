//! Error types for Tandem Core.

use thiserror::Error;

/// Validation errors for wire-level actions and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("action must be an object")]
    ActionNotObject,

    #[error("meta must be an object")]
    MetaNotObject,

    #[error("meta.id must be [time, node, seq]")]
    InvalidId,

    #[error("meta.time must be an integer")]
    InvalidTime,
}
