//! # Tandem Core
//!
//! Pure primitives for Tandem: actions, metadata, clocks and id generation.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Action`] - Opaque domain payload (a JSON object)
//! - [`Meta`] - Metadata attached to every action: id, time, added
//! - [`MetaId`] - Globally unique `(time, node, seq)` identifier
//! - [`Clock`] - Injectable time source ([`SystemClock`], [`TestClock`], [`ManualClock`])
//! - [`IdGenerator`] - Produces unique ids for one node

pub mod clock;
pub mod error;
pub mod meta;
pub mod types;
pub mod validation;

pub use clock::{Clock, IdGenerator, ManualClock, SystemClock, TestClock};
pub use error::ValidationError;
pub use meta::{Meta, MetaId};
pub use types::{Action, NodeId};
pub use validation::{parse_action, parse_meta, validate_action};
