//! # Tandem Testkit
//!
//! Testing utilities for Tandem.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Deterministic logs and connected engine pairs
//! - **Generators**: Proptest strategies for actions and operation interleavings
//! - **Wire vectors**: Malformed messages with the exact error reply they produce
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use tandem_core::Action;
//! use tandem_store::LogExt;
//! use tandem_testkit::SyncPair;
//!
//! async fn example() {
//!     let test = SyncPair::connected().await.unwrap();
//!     test.client_log.add(Action::of_type("a")).await.unwrap();
//!     test.settle().await;
//!     assert_eq!(test.server_log.actions().await.unwrap(), vec![Action::of_type("a")]);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tandem_testkit::generators::{ops, replay};
//!
//! proptest! {
//!     #[test]
//!     fn logs_converge(ops in ops(16)) {
//!         // replay inside a runtime, then compare both logs
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{settle, BaseClient, SyncPair, TestTime};
pub use generators::{replay, Op};
pub use vectors::{malformed_vectors, WireVector};
