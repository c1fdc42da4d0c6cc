//! Log trait: the abstract interface for action persistence.
//!
//! This trait allows the sync engine to be storage-agnostic. Implementations
//! include SQLite (durable) and in-memory (for tests).

use async_trait::async_trait;
use tandem_core::{Action, Meta, NodeId};

use crate::error::Result;

/// Where an entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Appended by the local application.
    Local,
    /// Received from the given remote node.
    ///
    /// The sync engine never sends such an entry back to that node.
    Remote(NodeId),
}

impl Origin {
    /// Whether this entry was received from `node`.
    pub fn is_from(&self, node: &NodeId) -> bool {
        matches!(self, Origin::Remote(remote) if remote == node)
    }
}

/// A stored action with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub action: Action,
    pub meta: Meta,
    pub origin: Origin,
}

/// Result of appending an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendResult {
    /// The action was stored; `added` is filled in.
    Added(Meta),
    /// An action with the same id is already stored (idempotent - not an error).
    Duplicate,
}

impl AppendResult {
    /// The stored metadata, if the append took effect.
    pub fn meta(&self) -> Option<&Meta> {
        match self {
            AppendResult::Added(meta) => Some(meta),
            AppendResult::Duplicate => None,
        }
    }
}

/// Per-remote replication watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatermarkKind {
    /// Highest local `added` the remote has acknowledged.
    LastSent,
    /// Highest remote progress value applied locally.
    LastReceived,
    /// Highest local `added` with nothing left to send at or below it.
    ///
    /// Covers entries the remote acknowledged plus entries that were never
    /// meant for it (filtered out, failed a hook, or received from it).
    LastSkipped,
}

impl WatermarkKind {
    /// Stable name used by persistent stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            WatermarkKind::LastSent => "last_sent",
            WatermarkKind::LastReceived => "last_received",
            WatermarkKind::LastSkipped => "last_skipped",
        }
    }
}

/// Enumeration order for [`Log::entries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrder {
    /// Newest first by `(time, id)`.
    Created,
    /// Newest first by `added`.
    Added,
}

/// Callback invoked synchronously after every successful append.
///
/// Returning `false` unsubscribes the listener.
pub type AppendListener = Box<dyn Fn(&Entry) -> bool + Send + Sync>;

/// The Log trait: async interface for an ordered, append-only action log.
///
/// # Design Notes
///
/// - **Monotonic `added`**: every successful append gets an `added` value
///   greater than all previous ones. It is meaningful only inside this log.
/// - **Idempotent appends**: appending an id that is already stored returns
///   `Duplicate` and changes nothing.
/// - **Append only**: entries are never deleted or reordered.
#[async_trait]
pub trait Log: Send + Sync {
    /// The node that owns this log and generates ids for local actions.
    fn node_id(&self) -> &NodeId;

    /// Append an action.
    ///
    /// With `meta == None` a fresh id and timestamp are generated. A given
    /// meta keeps its id and time; its `added` is always reassigned.
    async fn append(
        &self,
        action: Action,
        meta: Option<Meta>,
        origin: Origin,
    ) -> Result<AppendResult>;

    /// Entries with `added > since`, newest first.
    async fn entries_since(&self, since: u64) -> Result<Vec<Entry>>;

    /// All entries in the given order.
    async fn entries(&self, order: EntryOrder) -> Result<Vec<Entry>>;

    /// The newest `added` value, or 0 for an empty log.
    async fn last_added(&self) -> Result<u64>;

    /// Read a watermark for `remote` (0 if never set).
    async fn watermark(&self, remote: &NodeId, kind: WatermarkKind) -> Result<u64>;

    /// Persist a watermark for `remote`.
    async fn set_watermark(&self, remote: &NodeId, kind: WatermarkKind, value: u64)
        -> Result<()>;

    /// Register a listener for appends.
    fn subscribe(&self, listener: AppendListener);
}

/// Extension trait for common log patterns.
pub trait LogExt: Log {
    /// Append a local action with a generated id.
    fn add(
        &self,
        action: Action,
    ) -> impl std::future::Future<Output = Result<AppendResult>> + Send;

    /// Append a local action with caller-supplied metadata.
    fn add_with_meta(
        &self,
        action: Action,
        meta: Meta,
    ) -> impl std::future::Future<Output = Result<AppendResult>> + Send;

    /// All actions in created order, newest first.
    fn actions(&self) -> impl std::future::Future<Output = Result<Vec<Action>>> + Send;
}

impl<L: Log + ?Sized> LogExt for L {
    async fn add(&self, action: Action) -> Result<AppendResult> {
        self.append(action, None, Origin::Local).await
    }

    async fn add_with_meta(&self, action: Action, meta: Meta) -> Result<AppendResult> {
        self.append(action, Some(meta), Origin::Local).await
    }

    async fn actions(&self) -> Result<Vec<Action>> {
        let entries = self.entries(EntryOrder::Created).await?;
        Ok(entries.into_iter().map(|entry| entry.action).collect())
    }
}

/// Listener registry shared by log implementations.
///
/// Listeners are called outside any store lock. A listener that returns
/// `false` is dropped.
#[derive(Default)]
pub struct Listeners {
    inner: std::sync::Mutex<Vec<AppendListener>>,
}

impl Listeners {
    /// Register a listener.
    pub fn push(&self, listener: AppendListener) {
        let mut listeners = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(listener);
    }

    /// Notify all listeners of a new entry.
    pub fn notify(&self, entry: &Entry) {
        let mut listeners = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.retain(|listener| listener(entry));
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.lock().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("Listeners").field("count", &count).finish()
    }
}
