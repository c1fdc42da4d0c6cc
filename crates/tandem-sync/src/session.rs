//! Handshake, keepalive and connection lifecycle shared by all engines.
//!
//! Every engine is an actor: connection events, log appends and handle
//! requests are queued into one inbox and processed strictly in arrival
//! order by a single task. Each connect or disconnect bumps a generation
//! counter; work belonging to an older generation is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use tandem_core::{Clock, NodeId, SystemClock};

use crate::connection::{Connection, ConnectionEvent, EventListener};
use crate::error::{Result, SyncError};
use crate::messages::{Message, PROTOCOL_VERSION};
use crate::role::{Role, TimeFix};

/// Buffered failures per subscriber before old ones are dropped.
const FAILURE_CAPACITY: usize = 64;

/// Settings shared by the sync and presence engines.
#[derive(Clone)]
pub struct SessionConfig {
    /// Correct the peer's timestamps for clock skew (active side only).
    pub fix_time: bool,
    /// Time source for handshake timestamps.
    pub clock: Arc<dyn Clock>,
    /// Send `ping` at this interval while established.
    ///
    /// A ping still unanswered at the next tick ends the connection.
    pub ping_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fix_time: true,
            clock: Arc::new(SystemClock),
            ping_interval: None,
        }
    }
}

impl SessionConfig {
    pub fn with_fix_time(mut self, fix_time: bool) -> Self {
        self.fix_time = fix_time;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("fix_time", &self.fix_time)
            .field("ping_interval", &self.ping_interval)
            .finish_non_exhaustive()
    }
}

/// Handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Never connected.
    Idle,
    /// Connected, handshake in progress.
    Connecting,
    /// Handshake complete.
    Established,
    /// Connection closed; waiting for a reconnect.
    Disconnected,
}

/// Counters kept over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Entries transmitted.
    pub sent: u64,
    /// Entries received and appended.
    pub received: u64,
    /// Received entries already present in the log.
    pub duplicates: u64,
    /// Entries dropped by a filter hook, either direction.
    pub filtered: u64,
}

/// Snapshot of an engine, published after every processed event.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub state: SyncState,
    /// Peer node id, once the handshake completed.
    pub remote: Option<NodeId>,
    /// Highest local `added` acknowledged by the remote.
    pub synced: u64,
    /// Highest remote progress applied locally.
    pub other_synced: u64,
    /// Current clock offset, 0 when not corrected.
    pub time_fix: i64,
    pub stats: SyncStats,
}

/// Inbox events.
pub(crate) enum Event {
    Connect(u64),
    Disconnect(u64),
    Message(u64, Value),
    Appended,
    SendPing,
    Advance(u64),
    Tick,
    Drain(oneshot::Sender<usize>),
    Shutdown,
}

/// Handle to a running engine.
///
/// Cloning is cheap; all clones talk to the same engine.
#[derive(Clone)]
pub struct SyncHandle {
    inbox: mpsc::UnboundedSender<Event>,
    status: watch::Receiver<SyncStatus>,
    failures: broadcast::Sender<Arc<SyncError>>,
}

impl SyncHandle {
    /// Latest published status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Wait until every event queued before this call is processed.
    ///
    /// Returns how many events were processed since the previous drain.
    pub async fn drain(&self) -> Result<usize> {
        let (reply, processed) = oneshot::channel();
        self.send_event(Event::Drain(reply))?;
        processed.await.map_err(|_| SyncError::Closed)
    }

    /// Send a `ping` now.
    pub fn ping(&self) -> Result<()> {
        self.send_event(Event::SendPing)
    }

    /// Subscribe to reportable failures.
    ///
    /// Only failures raised after subscribing are delivered.
    pub fn failures(&self) -> broadcast::Receiver<Arc<SyncError>> {
        self.failures.subscribe()
    }

    /// Stop the engine. The connection is left as it is.
    pub fn shutdown(&self) {
        let _ = self.inbox.send(Event::Shutdown);
    }

    pub(crate) fn send_event(&self, event: Event) -> Result<()> {
        self.inbox.send(event).map_err(|_| SyncError::Closed)
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("status", &*self.status.borrow())
            .finish()
    }
}

/// Result of processing one incoming message in the shared layer.
pub(crate) enum Step {
    /// Fully handled.
    Done,
    /// The handshake just completed.
    Established,
    /// `sync` or `synced` on an established connection.
    Forward(Message),
}

/// Connection-level state shared by the engines.
pub(crate) struct Session<C: Connection> {
    pub role: Role,
    pub node_id: NodeId,
    pub connection: Arc<C>,
    pub config: SessionConfig,
    pub state: SyncState,
    pub remote: Option<NodeId>,
    pub time_fix: TimeFix,
    pub synced: u64,
    pub other_synced: u64,
    generation: Arc<AtomicU64>,
    current: u64,
    connect_started: Option<i64>,
    ping_pending: bool,
    failures: broadcast::Sender<Arc<SyncError>>,
}

impl<C: Connection> Session<C> {
    pub fn new(
        role: Role,
        node_id: NodeId,
        connection: C,
        config: SessionConfig,
        inbox: &mpsc::UnboundedSender<Event>,
        failures: broadcast::Sender<Arc<SyncError>>,
    ) -> Self {
        let connection = Arc::new(connection);
        let generation = Arc::new(AtomicU64::new(0));
        connection.attach(listener(inbox.clone(), Arc::clone(&generation)));

        if connection.is_connected() {
            let gen = generation.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = inbox.send(Event::Connect(gen));
        }

        Self {
            role,
            node_id,
            connection,
            config,
            state: SyncState::Idle,
            remote: None,
            time_fix: TimeFix::NONE,
            synced: 0,
            other_synced: 0,
            generation,
            current: 0,
            connect_started: None,
            ping_pending: false,
            failures,
        }
    }

    fn now(&self) -> i64 {
        self.config.clock.now()
    }

    /// Whether `gen` is the open connection incarnation.
    pub fn is_current(&self, gen: u64) -> bool {
        gen == self.current
            && gen == self.generation.load(Ordering::SeqCst)
            && matches!(self.state, SyncState::Connecting | SyncState::Established)
    }

    pub fn is_live(&self) -> bool {
        self.is_current(self.current)
    }

    pub fn is_established(&self) -> bool {
        self.state == SyncState::Established && self.is_live()
    }

    pub fn raise_other_synced(&mut self, value: u64) {
        self.other_synced = self.other_synced.max(value);
    }

    pub fn status(&self, stats: SyncStats) -> SyncStatus {
        SyncStatus {
            state: self.state,
            remote: self.remote.clone(),
            synced: self.synced,
            other_synced: self.other_synced,
            time_fix: self.time_fix.offset(),
            stats,
        }
    }

    pub async fn on_connect(&mut self, gen: u64) {
        self.current = gen;
        self.state = SyncState::Connecting;
        self.remote = None;
        self.time_fix = TimeFix::NONE;
        self.connect_started = None;
        self.ping_pending = false;
        debug!(node = %self.node_id, "connection opened");

        if self.role.initiates_handshake() {
            let now = self.now();
            self.connect_started = Some(now);
            let connect = Message::Connect {
                protocol: PROTOCOL_VERSION,
                node_id: self.node_id.clone(),
                time: Some(now),
            };
            self.send(&connect).await;
        }
    }

    pub fn on_disconnect(&mut self, gen: u64) {
        self.current = gen;
        if matches!(self.state, SyncState::Connecting | SyncState::Established) {
            info!(
                node = %self.node_id,
                remote = ?self.remote,
                synced = self.synced,
                "disconnected"
            );
        }
        self.state = SyncState::Disconnected;
        self.time_fix = TimeFix::NONE;
        self.ping_pending = false;
    }

    /// Send on the live connection. Returns whether the message went out.
    pub async fn send(&self, message: &Message) -> bool {
        if !self.is_live() {
            debug!(
                node = %self.node_id,
                kind = message.kind(),
                "dropping message for closed connection"
            );
            return false;
        }
        match self.connection.send(message.to_value()).await {
            Ok(()) => true,
            Err(err) => {
                debug!(node = %self.node_id, error = %err, "send failed");
                false
            }
        }
    }

    /// Publish a failure to subscribers.
    pub fn report(&self, err: SyncError) {
        warn!(node = %self.node_id, error = %err, "sync failure");
        let _ = self.failures.send(Arc::new(err));
    }

    /// Report a failure; protocol violations also end the connection.
    pub async fn fail(&mut self, err: SyncError) {
        if let Some(reply) = Message::error_for(&err) {
            self.send(&reply).await;
            self.state = SyncState::Disconnected;
            self.connection.disconnect().await;
        }
        self.report(err);
    }

    /// Validate an incoming message and handle the connection-level kinds.
    pub async fn handle(&mut self, gen: u64, raw: Value) -> Step {
        if !self.is_current(gen) {
            debug!(node = %self.node_id, "ignoring message from closed connection");
            return Step::Done;
        }

        let message = match Message::parse(&raw) {
            Ok(message) => message,
            Err(err) => {
                self.fail(err).await;
                return Step::Done;
            }
        };

        match message {
            Message::Connect {
                protocol, node_id, ..
            } if !self.role.initiates_handshake() => {
                if protocol != PROTOCOL_VERSION {
                    self.fail(SyncError::WrongProtocol {
                        local: PROTOCOL_VERSION,
                        peer: protocol,
                    })
                    .await;
                    return Step::Done;
                }
                let reply = Message::Connected {
                    protocol: PROTOCOL_VERSION,
                    node_id: self.node_id.clone(),
                    time: Some(self.now()),
                };
                self.send(&reply).await;
                self.establish(node_id);
                Step::Established
            }
            Message::Connected {
                protocol,
                node_id,
                time,
            } if self.role.initiates_handshake() => {
                if protocol != PROTOCOL_VERSION {
                    self.fail(SyncError::WrongProtocol {
                        local: PROTOCOL_VERSION,
                        peer: protocol,
                    })
                    .await;
                    return Step::Done;
                }
                if self.config.fix_time && self.role.computes_time_fix() {
                    if let (Some(sent_at), Some(peer_time)) = (self.connect_started, time) {
                        self.time_fix = TimeFix::estimate(sent_at, self.now(), peer_time);
                    }
                }
                self.establish(node_id);
                Step::Established
            }
            other @ (Message::Connect { .. } | Message::Connected { .. }) => {
                warn!(node = %self.node_id, kind = other.kind(), "unexpected handshake message");
                Step::Done
            }
            Message::Error { kind, details } => {
                self.report(SyncError::Peer { kind, details });
                Step::Done
            }
            other if self.state != SyncState::Established => {
                debug!(
                    node = %self.node_id,
                    kind = other.kind(),
                    "ignoring message before handshake"
                );
                Step::Done
            }
            Message::Ping(value) => {
                self.raise_other_synced(value);
                self.send(&Message::Pong(self.synced)).await;
                Step::Done
            }
            Message::Pong(value) => {
                self.raise_other_synced(value);
                self.ping_pending = false;
                Step::Done
            }
            other => Step::Forward(other),
        }
    }

    fn establish(&mut self, remote: NodeId) {
        info!(
            node = %self.node_id,
            remote = %remote,
            time_fix = self.time_fix.offset(),
            "handshake complete"
        );
        self.remote = Some(remote);
        self.state = SyncState::Established;
    }

    pub async fn send_ping(&mut self) {
        if !self.is_established() {
            return;
        }
        if self.send(&Message::Ping(self.synced)).await {
            self.ping_pending = true;
        }
    }

    pub async fn on_tick(&mut self) {
        if !self.is_established() {
            return;
        }
        if self.ping_pending {
            let interval = self.config.ping_interval.unwrap_or_default();
            self.fail(SyncError::Timeout(interval)).await;
        } else {
            self.send_ping().await;
        }
    }

    /// Handle lifecycle events common to every engine.
    ///
    /// Returns the event back when the engine must handle it itself.
    pub async fn on_lifecycle(&mut self, event: Event) -> Option<Event> {
        match event {
            Event::Connect(gen) => self.on_connect(gen).await,
            Event::Disconnect(gen) => self.on_disconnect(gen),
            Event::SendPing => self.send_ping().await,
            Event::Tick => self.on_tick().await,
            other => return Some(other),
        }
        None
    }
}

fn listener(inbox: mpsc::UnboundedSender<Event>, generation: Arc<AtomicU64>) -> EventListener {
    Arc::new(move |event| {
        let event = match event {
            ConnectionEvent::Connect => {
                Event::Connect(generation.fetch_add(1, Ordering::SeqCst) + 1)
            }
            ConnectionEvent::Disconnect => {
                Event::Disconnect(generation.fetch_add(1, Ordering::SeqCst) + 1)
            }
            ConnectionEvent::Message(raw) => Event::Message(generation.load(Ordering::SeqCst), raw),
        };
        let _ = inbox.send(event);
    })
}

/// An engine driven by the shared event loop.
#[async_trait]
pub(crate) trait Driver: Send + 'static {
    async fn on_event(&mut self, event: Event);

    fn status(&self) -> SyncStatus;
}

/// Inbox and failure channels for a new engine.
pub(crate) fn channels() -> (
    mpsc::UnboundedSender<Event>,
    mpsc::UnboundedReceiver<Event>,
    broadcast::Sender<Arc<SyncError>>,
) {
    let (inbox, events) = mpsc::unbounded_channel();
    let (failures, _) = broadcast::channel(FAILURE_CAPACITY);
    (inbox, events, failures)
}

/// Spawn the event loop for `driver` and return its handle.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn run<D: Driver>(
    driver: D,
    inbox: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    failures: broadcast::Sender<Arc<SyncError>>,
    ping_interval: Option<Duration>,
) -> SyncHandle {
    let (status_tx, status) = watch::channel(driver.status());
    tokio::spawn(event_loop(driver, events, status_tx, ping_interval));
    SyncHandle {
        inbox,
        status,
        failures,
    }
}

async fn event_loop<D: Driver>(
    mut driver: D,
    mut events: mpsc::UnboundedReceiver<Event>,
    status: watch::Sender<SyncStatus>,
    ping_interval: Option<Duration>,
) {
    let mut ticker = ping_interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut processed = 0usize;

    loop {
        let event = tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = next_tick(&mut ticker) => Event::Tick,
        };

        match event {
            Event::Drain(reply) => {
                let _ = reply.send(std::mem::take(&mut processed));
            }
            Event::Shutdown => break,
            event => {
                processed += 1;
                driver.on_event(event).await;
                status.send_replace(driver.status());
            }
        }
    }
    debug!("engine stopped");
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
