//! # Tandem Sync
//!
//! Replication protocol that converges two append-only action logs over
//! an unreliable, message-oriented connection.
//!
//! ## Overview
//!
//! Each engine is bound to one [`Connection`] and runs as a single-task
//! actor. The [`Role::Active`] side opens the handshake and corrects the
//! peer's clock; the [`Role::Passive`] side answers. Once established,
//! new log entries flow both ways as `sync` batches acknowledged by
//! `synced`, and resume exactly where they stopped after a reconnect.
//!
//! ## Key Properties
//!
//! - **Gap-free**: Entries appended while disconnected are replayed on reconnect
//! - **Idempotent**: Replays are deduplicated by action id
//! - **No echo**: Entries received from a peer are never sent back to it
//! - **Deterministic**: Filter/map hooks are awaited in order, inside the actor
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tandem_core::Action;
//! use tandem_store::{LogExt, MemoryLog};
//! use tandem_sync::{Connection, LocalPair, SyncConfig, SyncSession};
//!
//! async fn example() {
//!     let pair = LocalPair::new();
//!     let client_log = Arc::new(MemoryLog::with_system_clock("client"));
//!     let server_log = Arc::new(MemoryLog::with_system_clock("server"));
//!
//!     let config = SyncConfig::default();
//!     let client =
//!         SyncSession::client("client", client_log.clone(), pair.left.clone(), config.clone());
//!     let server = SyncSession::server("server", server_log, pair.right.clone(), config);
//!     pair.left.connect().await.unwrap();
//!
//!     client_log.add(Action::of_type("hello")).await.unwrap();
//!     client.drain().await.unwrap();
//!     server.drain().await.unwrap();
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Client (active)                     Server (passive)
//!   |-------- connect ---------------->|
//!   |<------- connected ---------------|
//!   |-------- sync(1, a, meta) ------->|
//!   |<------- synced(1) ---------------|
//!   |<------- sync(2, b, meta) --------|
//!   |-------- synced(2) -------------->|
//!   |-------- ping(synced) ----------->|
//!   |<------- pong(synced) ------------|
//! ```

pub mod connection;
pub mod convergence;
pub mod error;
pub mod hooks;
pub mod messages;
pub mod presence;
pub mod protocol;
pub mod role;
pub mod session;

pub use connection::local::{LocalConnection, LocalPair};
pub use connection::{Connection, ConnectionEvent, EventListener};
pub use convergence::{log_digest, verify_convergence, ConvergenceResult, LogDigest};
pub use error::{Result, SyncError};
pub use hooks::{filter_fn, map_fn, Filter, HookError, HookKind, Hooks, Mapper};
pub use messages::{error_kind, Message, PROTOCOL_VERSION};
pub use presence::{PresenceHandle, PresenceSession};
pub use protocol::{Batching, SyncConfig, SyncSession};
pub use role::{Role, TimeFix};
pub use session::{SessionConfig, SyncHandle, SyncState, SyncStats, SyncStatus};
