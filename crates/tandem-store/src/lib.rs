//! # Tandem Store
//!
//! Log abstraction for Tandem. Provides a trait-based interface for an
//! ordered, append-only action log with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Log`] - The async trait for all log operations
//! - [`SqliteLog`] - SQLite-based durable log
//! - [`MemoryLog`] - In-memory log for tests
//! - [`AppendResult`] - Result of appending an action
//! - [`WatermarkKind`] - Per-remote replication progress markers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tandem_core::{Action, SystemClock};
//! use tandem_store::{LogExt, SqliteLog};
//!
//! async fn example() {
//!     let log = SqliteLog::open("tandem.db", "node-1", Arc::new(SystemClock)).unwrap();
//!     let result = log.add(Action::of_type("hello")).await.unwrap();
//!     println!("stored with added={}", result.meta().unwrap().added);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same id twice returns `Duplicate`
//! - **Origin tracking**: Entries remember which remote they came from
//! - **Watermarks**: `last_sent`/`last_received` are stored per remote node
//! - **Listeners**: Appends are announced synchronously to subscribers

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryLog;
pub use sqlite::SqliteLog;
pub use traits::{
    AppendListener, AppendResult, Entry, EntryOrder, Listeners, Log, LogExt, Origin,
    WatermarkKind,
};
