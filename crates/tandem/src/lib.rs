//! # Tandem
//!
//! The unified API for Tandem: replicated, append-only action logs kept in
//! step between two peers over any ordered message channel.
//!
//! ## Overview
//!
//! Tandem provides an offline-first library for:
//!
//! - **Logs**: Ordered, append-only storage of actions with unique ids
//! - **Sync**: Incremental replication with acknowledgements and resume
//! - **Time correction**: Creation times adjusted for peer clock skew
//! - **Hooks**: Per-direction filters and maps applied to every action
//!
//! ## Key Concepts
//!
//! - **Action**: An opaque JSON object with a `type`. Never edited.
//! - **Meta**: The action's id, creation time and local `added` counter.
//! - **Watermark**: How far each side has acknowledged the other's log.
//! - **Role**: The active side opens the handshake and estimates skew.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tandem::{Action, Connection, LocalPair, Node, NodeConfig};
//!
//! async fn example() {
//!     let alice = Node::in_memory("alice", NodeConfig::default());
//!     let bob = Node::open("bob.db", "bob", NodeConfig::default()).unwrap();
//!
//!     let pair = LocalPair::new();
//!     let client = alice.connect(pair.left.clone());
//!     let server = bob.accept(pair.right.clone());
//!     pair.left.connect().await.unwrap();
//!
//!     alice.add(Action::of_type("greet")).await.unwrap();
//!     client.drain().await.unwrap();
//!     server.drain().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `tandem::core` - Core primitives (Action, Meta, clocks)
//! - `tandem::store` - Log abstraction, SQLite and in-memory logs
//! - `tandem::sync` - Sync protocol, connections and hooks

pub mod error;
pub mod node;

// Re-export component crates
pub use tandem_core as core;
pub use tandem_store as store;
pub use tandem_sync as sync;

// Re-export main types for convenience
pub use error::{Result, TandemError};
pub use node::{Node, NodeConfig};

// Re-export commonly used types
pub use tandem_core::{Action, Clock, Meta, MetaId, NodeId, SystemClock};
pub use tandem_store::{AppendResult, Log, LogExt, MemoryLog, SqliteLog};
pub use tandem_sync::{
    Batching, Connection, Hooks, LocalConnection, LocalPair, Role, SessionConfig, SyncConfig,
    SyncError, SyncHandle, SyncState, SyncStatus,
};
