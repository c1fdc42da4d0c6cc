//! Connection abstraction for the sync protocol.
//!
//! A connection is a duplex, message-oriented channel with a lifecycle.
//! The engine registers one listener per connection and reacts to
//! connect, message and disconnect events; it never reconnects on its own.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, SyncError};

/// Lifecycle and data events delivered to the attached listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The channel became connected.
    Connect,
    /// A message arrived from the other side.
    Message(Value),
    /// The channel was closed.
    Disconnect,
}

/// Callback receiving connection events.
pub type EventListener = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Connection trait consumed by the sync engines.
///
/// Implementations must preserve send order and must deliver events to the
/// listener in the order they happen.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Register the event listener, replacing any previous one.
    fn attach(&self, listener: EventListener);

    /// Whether the channel is currently connected.
    fn is_connected(&self) -> bool;

    /// Open the channel.
    async fn connect(&self) -> Result<()>;

    /// Close the channel.
    async fn disconnect(&self);

    /// Send a message to the other side.
    async fn send(&self, message: Value) -> Result<()>;
}

/// Two in-memory connections wired to each other.
///
/// Used by tests and by embedders running both peers in one process.
pub mod local {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct SideState {
        listener: Option<EventListener>,
        received: Vec<Value>,
    }

    #[derive(Default)]
    struct PairInner {
        connected: AtomicBool,
        sides: [Mutex<SideState>; 2],
    }

    impl PairInner {
        fn side(&self, index: usize) -> std::sync::MutexGuard<'_, SideState> {
            match self.sides[index].lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }

        /// Deliver an event to one side, outside of its lock.
        fn emit(&self, index: usize, event: ConnectionEvent) {
            let listener = {
                let mut side = self.side(index);
                if let ConnectionEvent::Message(message) = &event {
                    side.received.push(message.clone());
                }
                side.listener.clone()
            };
            if let Some(listener) = listener {
                listener(event);
            }
        }
    }

    /// A connected pair of [`LocalConnection`]s.
    pub struct LocalPair {
        pub left: LocalConnection,
        pub right: LocalConnection,
    }

    impl LocalPair {
        /// Create a disconnected pair.
        pub fn new() -> Self {
            let inner = Arc::new(PairInner::default());
            Self {
                left: LocalConnection {
                    inner: Arc::clone(&inner),
                    side: 0,
                },
                right: LocalConnection { inner, side: 1 },
            }
        }
    }

    impl Default for LocalPair {
        fn default() -> Self {
            Self::new()
        }
    }

    /// One end of a [`LocalPair`].
    ///
    /// Sends are delivered synchronously to the other end's listener.
    #[derive(Clone)]
    pub struct LocalConnection {
        inner: Arc<PairInner>,
        side: usize,
    }

    impl LocalConnection {
        /// The opposite end of the pair.
        pub fn other(&self) -> LocalConnection {
            LocalConnection {
                inner: Arc::clone(&self.inner),
                side: 1 - self.side,
            }
        }

        /// Every message this end has received so far.
        pub fn received(&self) -> Vec<Value> {
            self.inner.side(self.side).received.clone()
        }

        /// Take and clear the received history.
        pub fn take_received(&self) -> Vec<Value> {
            std::mem::take(&mut self.inner.side(self.side).received)
        }
    }

    #[async_trait]
    impl Connection for LocalConnection {
        fn attach(&self, listener: EventListener) {
            self.inner.side(self.side).listener = Some(listener);
        }

        fn is_connected(&self) -> bool {
            self.inner.connected.load(Ordering::SeqCst)
        }

        async fn connect(&self) -> Result<()> {
            if self.inner.connected.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            self.inner.emit(1 - self.side, ConnectionEvent::Connect);
            self.inner.emit(self.side, ConnectionEvent::Connect);
            Ok(())
        }

        async fn disconnect(&self) {
            if !self.inner.connected.swap(false, Ordering::SeqCst) {
                return;
            }
            self.inner.emit(self.side, ConnectionEvent::Disconnect);
            self.inner.emit(1 - self.side, ConnectionEvent::Disconnect);
        }

        async fn send(&self, message: Value) -> Result<()> {
            if !self.is_connected() {
                return Err(SyncError::Transport("connection is not open".into()));
            }
            self.inner
                .emit(1 - self.side, ConnectionEvent::Message(message));
            Ok(())
        }
    }

    impl std::fmt::Debug for LocalConnection {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("LocalConnection")
                .field("side", &if self.side == 0 { "left" } else { "right" })
                .field("connected", &self.is_connected())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::local::LocalPair;
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder() -> (EventListener, Arc<Mutex<Vec<ConnectionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: EventListener = Arc::new(move |event| sink.lock().unwrap().push(event));
        (listener, events)
    }

    #[tokio::test]
    async fn test_local_pair_lifecycle() {
        let pair = LocalPair::new();
        let (left_listener, left_events) = recorder();
        let (right_listener, right_events) = recorder();
        pair.left.attach(left_listener);
        pair.right.attach(right_listener);

        pair.left.connect().await.unwrap();
        assert!(pair.left.is_connected());
        assert!(pair.right.is_connected());

        pair.left.send(json!(["ping", 1])).await.unwrap();
        pair.right.disconnect().await;
        assert!(!pair.left.is_connected());

        assert_eq!(
            *right_events.lock().unwrap(),
            vec![
                ConnectionEvent::Connect,
                ConnectionEvent::Message(json!(["ping", 1])),
                ConnectionEvent::Disconnect,
            ]
        );
        assert_eq!(
            *left_events.lock().unwrap(),
            vec![ConnectionEvent::Connect, ConnectionEvent::Disconnect]
        );
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let pair = LocalPair::new();
        let err = pair.left.send(json!(["ping", 0])).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test]
    async fn test_received_history_and_other() {
        let pair = LocalPair::new();
        pair.left.connect().await.unwrap();
        pair.left.other().send(json!(["synced", 1])).await.unwrap();

        assert_eq!(pair.left.received(), vec![json!(["synced", 1])]);
        assert_eq!(pair.left.take_received(), vec![json!(["synced", 1])]);
        assert!(pair.left.received().is_empty());
        assert!(pair.right.received().is_empty());
    }

    #[tokio::test]
    async fn test_attach_replaces_listener() {
        let pair = LocalPair::new();
        let (first, first_events) = recorder();
        let (second, second_events) = recorder();
        pair.right.attach(first);
        pair.right.attach(second);

        pair.left.connect().await.unwrap();
        assert!(first_events.lock().unwrap().is_empty());
        assert_eq!(*second_events.lock().unwrap(), vec![ConnectionEvent::Connect]);
    }
}
