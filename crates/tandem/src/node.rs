//! The Node: unified API for a replicated log.
//!
//! A node owns one log and an identity, and starts sync or presence
//! engines on connections handed to it. Reconnecting a dropped connection
//! is left to the caller; the engines resume on their own once it is back.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use tandem_core::{Action, Meta, NodeId};
use tandem_store::{AppendResult, Log, LogExt, MemoryLog, SqliteLog};
use tandem_sync::{
    log_digest, Connection, LogDigest, PresenceHandle, PresenceSession, Role, SyncConfig,
    SyncHandle, SyncSession,
};

use crate::error::Result;

/// Configuration for a node.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Settings for every engine the node starts.
    pub sync: SyncConfig,
}

impl NodeConfig {
    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

/// The main Node struct.
///
/// Provides a unified API for:
/// - Appending and reading actions
/// - Syncing with peers as client or server
/// - Presence-only links
pub struct Node<L: Log + ?Sized> {
    node_id: NodeId,
    log: Arc<L>,
    config: NodeConfig,
}

impl Node<MemoryLog> {
    /// Node backed by an in-memory log.
    ///
    /// Ids are generated from the configured session clock.
    pub fn in_memory(node_id: impl Into<NodeId>, config: NodeConfig) -> Self {
        let node_id = node_id.into();
        let log = MemoryLog::new(node_id.clone(), Arc::clone(&config.sync.session.clock));
        Self::new(node_id, Arc::new(log), config)
    }
}

impl Node<SqliteLog> {
    /// Node backed by a SQLite database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        node_id: impl Into<NodeId>,
        config: NodeConfig,
    ) -> Result<Self> {
        let node_id = node_id.into();
        let log = SqliteLog::open(path, node_id.clone(), Arc::clone(&config.sync.session.clock))?;
        Ok(Self::new(node_id, Arc::new(log), config))
    }
}

impl<L: Log + ?Sized + 'static> Node<L> {
    /// Create a node over an existing log.
    ///
    /// `node_id` is announced in handshakes and may differ from the id the
    /// log stamps on new actions.
    pub fn new(node_id: impl Into<NodeId>, log: Arc<L>, config: NodeConfig) -> Self {
        Self {
            node_id: node_id.into(),
            log,
            config,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Log Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a local action with a generated id.
    pub async fn add(&self, action: Action) -> Result<AppendResult> {
        Ok(self.log.add(action).await?)
    }

    /// Append a local action with explicit metadata.
    pub async fn add_with_meta(&self, action: Action, meta: Meta) -> Result<AppendResult> {
        Ok(self.log.add_with_meta(action, meta).await?)
    }

    /// All actions, newest first by creation time.
    pub async fn actions(&self) -> Result<Vec<Action>> {
        Ok(self.log.actions().await?)
    }

    /// Digest of the log for convergence checks.
    pub async fn digest(&self) -> Result<LogDigest> {
        Ok(log_digest(&*self.log).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Sync over `connection` as the active side.
    pub fn connect<C: Connection>(&self, connection: C) -> SyncHandle {
        self.spawn(Role::Active, connection)
    }

    /// Sync over `connection` as the passive side.
    pub fn accept<C: Connection>(&self, connection: C) -> SyncHandle {
        self.spawn(Role::Passive, connection)
    }

    /// Keepalive-only link over `connection`.
    pub fn presence<C: Connection>(&self, role: Role, connection: C) -> PresenceHandle {
        info!(node = %self.node_id, ?role, "starting presence engine");
        PresenceSession::spawn(
            role,
            self.node_id.clone(),
            connection,
            self.config.sync.session.clone(),
        )
    }

    fn spawn<C: Connection>(&self, role: Role, connection: C) -> SyncHandle {
        info!(node = %self.node_id, ?role, "starting sync engine");
        SyncSession::spawn(
            role,
            self.node_id.clone(),
            Arc::clone(&self.log),
            connection,
            self.config.sync.clone(),
        )
    }
}

impl<L: Log + ?Sized> std::fmt::Debug for Node<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{MetaId, TestClock};
    use tandem_sync::{LocalPair, SessionConfig};
    use tandem_testkit::settle;

    fn config(clock: &TestClock) -> NodeConfig {
        NodeConfig::default().with_sync(
            SyncConfig::default().with_session(
                SessionConfig::default()
                    .with_clock(clock.clone())
                    .with_fix_time(false),
            ),
        )
    }

    #[tokio::test]
    async fn test_in_memory_node_uses_session_clock() {
        let clock = TestClock::new();
        let node = Node::in_memory("alice", config(&clock));

        let result = node.add(Action::of_type("a")).await.unwrap();
        assert_eq!(result.meta().unwrap().id, MetaId::new(1, "alice", 0));
        assert_eq!(node.actions().await.unwrap(), vec![Action::of_type("a")]);
    }

    #[tokio::test]
    async fn test_nodes_sync_over_local_pair() {
        let clock = TestClock::new();
        let alice = Node::in_memory("alice", config(&clock));
        let bob = Node::in_memory("bob", config(&clock));
        let pair = LocalPair::new();

        let client = alice.connect(pair.left.clone());
        let server = bob.accept(pair.right.clone());
        pair.left.connect().await.unwrap();

        alice.add(Action::of_type("from-alice")).await.unwrap();
        bob.add(Action::of_type("from-bob")).await.unwrap();
        settle(&[&client, &server]).await;

        assert_eq!(alice.actions().await.unwrap(), bob.actions().await.unwrap());
        assert_eq!(alice.digest().await.unwrap(), bob.digest().await.unwrap());
        assert_eq!(client.status().remote, Some(NodeId::new("bob")));
    }
}
