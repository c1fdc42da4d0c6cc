//! Lightweight presence engine: handshake and keepalive only.
//!
//! No log is attached. The engine's own progress counter travels in
//! `ping`/`pong` so the peer's `other_synced` still advances; `sync` and
//! `synced` are not part of this protocol and end the connection.

use async_trait::async_trait;

use tandem_core::NodeId;

use crate::connection::Connection;
use crate::error::{Result, SyncError};
use crate::role::Role;
use crate::session::{
    channels, run, Driver, Event, Session, SessionConfig, Step, SyncHandle, SyncStats, SyncStatus,
};

/// Presence engine for one connection.
pub struct PresenceSession<C: Connection> {
    session: Session<C>,
}

impl<C: Connection> PresenceSession<C> {
    /// Start a presence engine. Must be called from within a Tokio runtime.
    pub fn spawn(
        role: Role,
        node_id: impl Into<NodeId>,
        connection: C,
        config: SessionConfig,
    ) -> PresenceHandle {
        let (inbox, events, failures) = channels();
        let ping_interval = config.ping_interval;
        let session = Session::new(
            role,
            node_id.into(),
            connection,
            config,
            &inbox,
            failures.clone(),
        );
        PresenceHandle {
            handle: run(PresenceSession { session }, inbox, events, failures, ping_interval),
        }
    }
}

#[async_trait]
impl<C: Connection> Driver for PresenceSession<C> {
    async fn on_event(&mut self, event: Event) {
        match self.session.on_lifecycle(event).await {
            Some(Event::Message(gen, raw)) => {
                if let Step::Forward(message) = self.session.handle(gen, raw).await {
                    self.session
                        .fail(SyncError::UnknownMessage(message.kind().to_owned()))
                        .await;
                }
            }
            Some(Event::Advance(value)) => {
                self.session.synced = self.session.synced.max(value);
            }
            _ => {}
        }
    }

    fn status(&self) -> SyncStatus {
        self.session.status(SyncStats::default())
    }
}

/// Handle to a running presence engine.
#[derive(Clone, Debug)]
pub struct PresenceHandle {
    handle: SyncHandle,
}

impl PresenceHandle {
    /// Raise the progress value announced in `ping`/`pong`. Never lowers it.
    pub fn advance(&self, synced: u64) -> Result<()> {
        self.handle.send_event(Event::Advance(synced))
    }

    /// The underlying engine handle (status, drain, ping, failures).
    pub fn as_handle(&self) -> &SyncHandle {
        &self.handle
    }
}

impl std::ops::Deref for PresenceHandle {
    type Target = SyncHandle;

    fn deref(&self) -> &SyncHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::local::LocalPair;
    use crate::session::SyncState;
    use serde_json::json;

    async fn settle(handles: &[&SyncHandle]) {
        loop {
            let mut processed = 0;
            for handle in handles {
                processed += handle.drain().await.unwrap();
            }
            if processed == 0 {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_presence_pair_exchanges_progress() {
        let pair = LocalPair::new();
        let config = SessionConfig::default();
        let client =
            PresenceSession::spawn(Role::Active, "client", pair.left.clone(), config.clone());
        let server =
            PresenceSession::spawn(Role::Passive, "server", pair.right.clone(), config);

        pair.left.connect().await.unwrap();
        settle(&[client.as_handle(), server.as_handle()]).await;
        assert_eq!(client.status().state, SyncState::Established);
        assert_eq!(server.status().remote, Some(NodeId::new("client")));

        client.advance(5).unwrap();
        client.advance(3).unwrap();
        client.ping().unwrap();
        settle(&[client.as_handle(), server.as_handle()]).await;

        assert_eq!(client.status().synced, 5);
        assert_eq!(server.status().other_synced, 5);

        server.advance(9).unwrap();
        server.ping().unwrap();
        settle(&[client.as_handle(), server.as_handle()]).await;
        assert_eq!(client.status().other_synced, 9);
    }

    #[tokio::test]
    async fn test_presence_rejects_sync() {
        let pair = LocalPair::new();
        let client = PresenceSession::spawn(
            Role::Active,
            "client",
            pair.left.clone(),
            SessionConfig::default(),
        );
        let mut failures = client.failures();

        pair.left.connect().await.unwrap();
        pair.right.send(json!(["connected", 1, "server"])).await.unwrap();
        settle(&[client.as_handle()]).await;

        pair.right
            .send(json!(["synced", 1]))
            .await
            .unwrap();
        settle(&[client.as_handle()]).await;

        assert!(!pair.left.is_connected());
        assert_eq!(
            pair.right.received().last(),
            Some(&json!(["error", "unknown-message", "synced"]))
        );
        assert!(matches!(
            &*failures.recv().await.unwrap(),
            SyncError::UnknownMessage(kind) if kind == "synced"
        ));
    }
}
