//! Convergence verification for sync protocol.
//!
//! After syncing, two logs can verify they hold the same set of actions
//! by comparing deterministic digests.

use std::collections::BTreeMap;

use tandem_core::MetaId;
use tandem_store::{EntryOrder, Log};

use crate::error::Result;

/// Deterministic summary of a log's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDigest {
    /// Number of entries.
    pub count: usize,
    /// Hex encoded blake3 hash.
    pub hash: String,
}

/// Compute the digest of a log.
///
/// Only ids and actions are hashed. `time` may legitimately differ between
/// peers after clock correction and `added` is local to each log.
///
/// Algorithm:
/// 1. Collect all entries sorted by id
/// 2. Hash: H = Blake3(prefix || for each: id || len(action) || action JSON)
pub async fn log_digest<L: Log + ?Sized>(log: &L) -> Result<LogDigest> {
    let contents = collect(log).await?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"tandem-log-v1:");
    for (id, action) in &contents {
        hasher.update(&id.time.to_be_bytes());
        hasher.update(&(id.node.as_str().len() as u64).to_be_bytes());
        hasher.update(id.node.as_str().as_bytes());
        hasher.update(&id.seq.to_be_bytes());
        hasher.update(&(action.len() as u64).to_be_bytes());
        hasher.update(action);
    }

    Ok(LogDigest {
        count: contents.len(),
        hash: hex::encode(hasher.finalize().as_bytes()),
    })
}

/// Compare two logs.
pub async fn verify_convergence<A, B>(local: &A, remote: &B) -> Result<ConvergenceResult>
where
    A: Log + ?Sized,
    B: Log + ?Sized,
{
    let local = collect(local).await?;
    let remote = collect(remote).await?;

    let mut only_local = Vec::new();
    let mut mismatched = Vec::new();
    for (id, action) in &local {
        match remote.get(id) {
            None => only_local.push(id.clone()),
            Some(other) if other != action => mismatched.push(id.clone()),
            Some(_) => {}
        }
    }
    let only_remote: Vec<MetaId> = remote
        .keys()
        .filter(|id| !local.contains_key(*id))
        .cloned()
        .collect();

    if only_local.is_empty() && only_remote.is_empty() && mismatched.is_empty() {
        Ok(ConvergenceResult::Converged)
    } else {
        Ok(ConvergenceResult::Diverged {
            only_local,
            only_remote,
            mismatched,
        })
    }
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both logs hold the same actions under the same ids.
    Converged,
    /// Logs differ (may need more sync rounds, or hooks dropped entries).
    Diverged {
        only_local: Vec<MetaId>,
        only_remote: Vec<MetaId>,
        /// Ids present on both sides with different actions.
        mismatched: Vec<MetaId>,
    },
}

impl ConvergenceResult {
    /// Check if the logs have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Ids mapped to their action's JSON encoding.
///
/// serde_json writes object keys in sorted order, so the encoding is
/// canonical.
async fn collect<L: Log + ?Sized>(log: &L) -> Result<BTreeMap<MetaId, Vec<u8>>> {
    let entries = log.entries(EntryOrder::Added).await?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let json = entry.action.as_value().to_string().into_bytes();
            (entry.meta.id, json)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tandem_core::{Action, Meta, TestClock};
    use tandem_store::{LogExt, MemoryLog};

    fn log(node: &str) -> MemoryLog {
        MemoryLog::new(node, Arc::new(TestClock::new()))
    }

    async fn put(log: &MemoryLog, action: Action, time: i64, node: &str) {
        log.add_with_meta(action, Meta::new(MetaId::new(time, node, 0)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_digest_ignores_append_order_and_time() {
        let a = log("test1");
        let b = log("test2");
        put(&a, Action::of_type("x"), 1, "test1").await;
        put(&a, Action::of_type("y"), 2, "test2").await;

        put(&b, Action::of_type("y"), 2, "test2").await;
        b.add_with_meta(
            Action::of_type("x"),
            Meta::new(MetaId::new(1, "test1", 0)).with_time(101),
        )
        .await
        .unwrap();

        let da = log_digest(&a).await.unwrap();
        let db = log_digest(&b).await.unwrap();
        assert_eq!(da, db);
        assert_eq!(da.count, 2);
        assert_eq!(da.hash.len(), 64);
        assert!(verify_convergence(&a, &b).await.unwrap().is_converged());
    }

    #[tokio::test]
    async fn test_digest_key_order_is_canonical() {
        let a = log("test1");
        let b = log("test2");
        let first = Action::new(json!({ "type": "set", "key": "k", "value": 1 })).unwrap();
        let second = Action::new(json!({ "value": 1, "key": "k", "type": "set" })).unwrap();
        put(&a, first, 1, "test1").await;
        put(&b, second, 1, "test1").await;

        assert_eq!(log_digest(&a).await.unwrap(), log_digest(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_divergence_reported() {
        let a = log("test1");
        let b = log("test2");
        put(&a, Action::of_type("x"), 1, "test1").await;
        put(&a, Action::of_type("same-id"), 3, "test1").await;
        put(&b, Action::of_type("z"), 2, "test2").await;
        put(&b, Action::of_type("other"), 3, "test1").await;

        let result = verify_convergence(&a, &b).await.unwrap();
        assert_eq!(
            result,
            ConvergenceResult::Diverged {
                only_local: vec![MetaId::new(1, "test1", 0)],
                only_remote: vec![MetaId::new(2, "test2", 0)],
                mismatched: vec![MetaId::new(3, "test1", 0)],
            }
        );
        assert_ne!(log_digest(&a).await.unwrap(), log_digest(&b).await.unwrap());
    }
}
