//! In-memory implementation of the Log trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use tandem_core::{Action, Clock, IdGenerator, Meta, MetaId, NodeId, SystemClock};

use crate::error::{Result, StoreError};
use crate::traits::{
    AppendListener, AppendResult, Entry, EntryOrder, Listeners, Log, Origin, WatermarkKind,
};

/// In-memory log implementation.
///
/// All data is lost when the log is dropped. Thread-safe via RwLock.
pub struct MemoryLog {
    ids: IdGenerator,
    inner: RwLock<MemoryLogInner>,
    listeners: Listeners,
}

#[derive(Default)]
struct MemoryLogInner {
    /// Entries in append order (ascending `added`).
    entries: Vec<Entry>,

    /// Ids of all stored entries.
    known: HashSet<MetaId>,

    /// Last assigned `added`.
    last_added: u64,

    /// Watermarks per remote.
    watermarks: HashMap<(NodeId, WatermarkKind), u64>,
}

impl MemoryLog {
    /// Create an empty log for `node` reading time from `clock`.
    pub fn new(node: impl Into<NodeId>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ids: IdGenerator::new(node.into(), clock),
            inner: RwLock::new(MemoryLogInner::default()),
            listeners: Listeners::default(),
        }
    }

    /// Create an empty log using the wall clock.
    pub fn with_system_clock(node: impl Into<NodeId>) -> Self {
        Self::new(node, Arc::new(SystemClock))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryLogInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryLogInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl Log for MemoryLog {
    fn node_id(&self) -> &NodeId {
        self.ids.node()
    }

    async fn append(
        &self,
        action: Action,
        meta: Option<Meta>,
        origin: Origin,
    ) -> Result<AppendResult> {
        let mut meta = meta.unwrap_or_else(|| Meta::new(self.ids.next_id()));

        let entry = {
            let mut inner = self.write()?;

            if inner.known.contains(&meta.id) {
                return Ok(AppendResult::Duplicate);
            }

            inner.last_added += 1;
            meta.added = inner.last_added;

            let entry = Entry {
                action,
                meta: meta.clone(),
                origin,
            };
            inner.known.insert(meta.id.clone());
            inner.entries.push(entry.clone());
            entry
        };

        self.listeners.notify(&entry);
        Ok(AppendResult::Added(meta))
    }

    async fn entries_since(&self, since: u64) -> Result<Vec<Entry>> {
        let inner = self.read()?;
        Ok(inner
            .entries
            .iter()
            .rev()
            .take_while(|entry| entry.meta.added > since)
            .cloned()
            .collect())
    }

    async fn entries(&self, order: EntryOrder) -> Result<Vec<Entry>> {
        let inner = self.read()?;
        let mut entries: Vec<Entry> = inner.entries.iter().rev().cloned().collect();
        if order == EntryOrder::Created {
            entries.sort_by(|a, b| b.meta.created_cmp(&a.meta));
        }
        Ok(entries)
    }

    async fn last_added(&self) -> Result<u64> {
        Ok(self.read()?.last_added)
    }

    async fn watermark(&self, remote: &NodeId, kind: WatermarkKind) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .watermarks
            .get(&(remote.clone(), kind))
            .copied()
            .unwrap_or(0))
    }

    async fn set_watermark(
        &self,
        remote: &NodeId,
        kind: WatermarkKind,
        value: u64,
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner.watermarks.insert((remote.clone(), kind), value);
        Ok(())
    }

    fn subscribe(&self, listener: AppendListener) {
        self.listeners.push(listener);
    }
}

impl std::fmt::Debug for MemoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLog")
            .field("node", self.ids.node())
            .finish_non_exhaustive()
    }
}
