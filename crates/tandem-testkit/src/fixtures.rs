//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tandem_core::TestClock;
use tandem_store::MemoryLog;
use tandem_sync::{
    Connection, LocalConnection, LocalPair, Result, SessionConfig, SyncConfig, SyncHandle,
    SyncSession,
};

/// Deterministic time shared by several logs.
///
/// Logs created by one `TestTime` read the same auto-incrementing clock,
/// so their generated ids never collide and are ordered by creation.
#[derive(Debug, Default)]
pub struct TestTime {
    clock: TestClock,
    logs: AtomicUsize,
}

impl TestTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared clock.
    pub fn clock(&self) -> TestClock {
        self.clock.clone()
    }

    /// A new empty log named `test1`, `test2`, ...
    pub fn next_log(&self) -> Arc<MemoryLog> {
        let n = self.logs.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(MemoryLog::new(format!("test{n}"), Arc::new(self.clock())))
    }
}

/// Wait until none of the engines has anything left to process.
///
/// Drains every handle in turn and repeats until a full round processed
/// no events. Engines that have shut down count as idle.
pub async fn settle(handles: &[&SyncHandle]) {
    loop {
        let mut processed = 0;
        for handle in handles {
            processed += handle.drain().await.unwrap_or(0);
        }
        if processed == 0 {
            break;
        }
    }
}

/// Client `"client"` and server `"server"` engines over a [`LocalPair`].
pub struct SyncPair {
    pub time: TestTime,
    pub client_log: Arc<MemoryLog>,
    pub server_log: Arc<MemoryLog>,
    pub client: SyncHandle,
    pub server: SyncHandle,
    pub pair: LocalPair,
}

impl SyncPair {
    /// Connected pair with the client's clock correction disabled.
    pub async fn connected() -> Result<Self> {
        let client =
            SyncConfig::default().with_session(SessionConfig::default().with_fix_time(false));
        Self::with_configs(client, SyncConfig::default()).await
    }

    /// Connected pair with explicit engine configurations.
    pub async fn with_configs(client: SyncConfig, server: SyncConfig) -> Result<Self> {
        let time = TestTime::new();
        let client_log = time.next_log();
        let server_log = time.next_log();
        let pair = LocalPair::new();

        let client =
            SyncSession::client("client", Arc::clone(&client_log), pair.left.clone(), client);
        let server =
            SyncSession::server("server", Arc::clone(&server_log), pair.right.clone(), server);
        pair.left.connect().await?;

        let test = Self {
            time,
            client_log,
            server_log,
            client,
            server,
            pair,
        };
        test.settle().await;
        Ok(test)
    }

    /// The client's end of the connection.
    pub fn left(&self) -> &LocalConnection {
        &self.pair.left
    }

    /// The server's end of the connection.
    pub fn right(&self) -> &LocalConnection {
        &self.pair.right
    }

    pub async fn settle(&self) {
        settle(&[&self.client, &self.server]).await;
    }
}

/// A single client engine whose peer is driven by hand through `right`.
pub struct BaseClient {
    pub log: Arc<MemoryLog>,
    pub client: SyncHandle,
    pub right: LocalConnection,
}

impl BaseClient {
    /// Connected client; the `connect` it sent is already cleared from
    /// `right`'s history.
    pub async fn connected() -> Result<Self> {
        let time = TestTime::new();
        let log = time.next_log();
        let pair = LocalPair::new();
        let client = SyncSession::client(
            "client",
            Arc::clone(&log),
            pair.left.clone(),
            SyncConfig::default(),
        );

        pair.left.connect().await?;
        settle(&[&client]).await;
        pair.right.take_received();

        Ok(Self {
            log,
            client,
            right: pair.right,
        })
    }

    pub async fn settle(&self) {
        settle(&[&self.client]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::Action;
    use tandem_store::{Log, LogExt};

    #[tokio::test]
    async fn test_next_log_names_and_shared_time() {
        let time = TestTime::new();
        let first = time.next_log();
        let second = time.next_log();
        assert_eq!(first.node_id().as_str(), "test1");
        assert_eq!(second.node_id().as_str(), "test2");

        let a = first.add(Action::of_type("a")).await.unwrap();
        let b = second.add(Action::of_type("b")).await.unwrap();
        assert_eq!(a.meta().unwrap().id.time, 1);
        assert_eq!(b.meta().unwrap().id.time, 2);
    }

    #[tokio::test]
    async fn test_sync_pair_is_established() {
        let test = SyncPair::connected().await.unwrap();
        assert!(test.left().is_connected());
        assert_eq!(test.client.status().remote.unwrap().as_str(), "server");
        assert_eq!(test.server.status().remote.unwrap().as_str(), "client");
    }
}
