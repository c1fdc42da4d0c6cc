//! Presence links between nodes.

use std::time::Duration;

use serde_json::json;

use tandem::core::{Action, TestClock};
use tandem::sync::{SessionConfig, SyncConfig, SyncError, SyncState};
use tandem::{Connection, LocalPair, Node, NodeConfig, Role};
use tandem_testkit::settle;

fn config(session: SessionConfig) -> NodeConfig {
    NodeConfig::default().with_sync(SyncConfig::default().with_session(session))
}

#[tokio::test(start_paused = true)]
async fn test_presence_keepalive_holds_link() {
    let session = SessionConfig::default()
        .with_clock(TestClock::new())
        .with_ping_interval(Duration::from_secs(10));
    let alice = Node::in_memory("alice", config(session.clone()));
    let bob = Node::in_memory("bob", config(session));
    let pair = LocalPair::new();

    let client = alice.presence(Role::Active, pair.left.clone());
    let server = bob.presence(Role::Passive, pair.right.clone());
    pair.left.connect().await.unwrap();
    settle(&[client.as_handle(), server.as_handle()]).await;

    client.advance(3).unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;
    settle(&[client.as_handle(), server.as_handle()]).await;

    assert!(pair.left.is_connected());
    assert_eq!(client.status().state, SyncState::Established);
    assert_eq!(server.status().other_synced, 3);
}

#[tokio::test]
async fn test_presence_closes_on_sync_traffic() {
    let alice = Node::in_memory("alice", NodeConfig::default());
    let bob = Node::in_memory("bob", NodeConfig::default());
    bob.add(Action::of_type("a")).await.unwrap();
    let pair = LocalPair::new();

    let client = alice.presence(Role::Active, pair.left.clone());
    let server = bob.accept(pair.right.clone());
    let mut failures = client.failures();
    pair.left.connect().await.unwrap();
    settle(&[client.as_handle(), &server]).await;

    assert!(!pair.left.is_connected());
    assert_eq!(
        pair.left.other().received().last(),
        Some(&json!(["error", "unknown-message", "sync"]))
    );
    assert!(matches!(
        &*failures.recv().await.unwrap(),
        SyncError::UnknownMessage(kind) if kind == "sync"
    ));
    assert!(alice.actions().await.unwrap().is_empty());
}
