//! Sync protocol engine.
//!
//! Replicates new log entries in both directions over one connection:
//! local appends go out as `sync` batches and are acknowledged by
//! `synced`; incoming batches are appended to the log as remote-origin
//! entries so they are never echoed back to their source.
//!
//! Progress is tracked by watermarks mirrored in the log per remote:
//! `last_sent` (our `synced`), `last_received` (our `other_synced`) and
//! `last_skipped`, the point below which nothing is left to send because
//! everything was either acknowledged or never meant for the remote.
//! After every handshake the engine resends everything past the higher of
//! `last_sent` and `last_skipped`, so nothing appended while disconnected
//! is lost; the log's id deduplication makes the replay idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use tandem_core::{Action, Meta, NodeId};
use tandem_store::{AppendResult, Entry, Log, Origin, WatermarkKind};

use crate::connection::Connection;
use crate::error::SyncError;
use crate::hooks::Hooks;
use crate::messages::Message;
use crate::role::Role;
use crate::session::{
    channels, run, Driver, Event, Session, SessionConfig, Step, SyncHandle, SyncStats, SyncStatus,
};

/// How pending local entries are grouped into `sync` messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Batching {
    /// Everything pending goes out in one `sync`.
    #[default]
    Coalesce,
    /// One `sync` per entry, its watermark being that entry's `added`.
    PerEntry,
}

/// Configuration for sync behavior.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub session: SessionConfig,
    pub hooks: Hooks,
    pub batching: Batching,
}

impl SyncConfig {
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_batching(mut self, batching: Batching) -> Self {
        self.batching = batching;
        self
    }
}

/// Full log replication engine for one connection.
pub struct SyncSession<L: Log + ?Sized, C: Connection> {
    session: Session<C>,
    log: Arc<L>,
    hooks: Hooks,
    batching: Batching,
    /// Highest local `added` already enumerated on this connection.
    sent: u64,
    /// Highest watermark transmitted on this connection.
    max_watermark: u64,
    /// Highest watermark acknowledged on this connection.
    acked: u64,
    /// Persisted `last_skipped`.
    skipped: u64,
    stats: SyncStats,
}

impl<L, C> SyncSession<L, C>
where
    L: Log + ?Sized + 'static,
    C: Connection,
{
    /// Start an engine on `connection` replicating `log`.
    ///
    /// `node_id` is the host id announced in the handshake. Must be called
    /// from within a Tokio runtime.
    pub fn spawn(
        role: Role,
        node_id: NodeId,
        log: Arc<L>,
        connection: C,
        config: SyncConfig,
    ) -> SyncHandle {
        let (inbox, events, failures) = channels();
        let ping_interval = config.session.ping_interval;
        let session = Session::new(
            role,
            node_id,
            connection,
            config.session,
            &inbox,
            failures.clone(),
        );

        let appends = inbox.clone();
        log.subscribe(Box::new(move |_: &Entry| appends.send(Event::Appended).is_ok()));

        let engine = SyncSession {
            session,
            log,
            hooks: config.hooks,
            batching: config.batching,
            sent: 0,
            max_watermark: 0,
            acked: 0,
            skipped: 0,
            stats: SyncStats::default(),
        };
        run(engine, inbox, events, failures, ping_interval)
    }

    /// Start the active side: sends `connect` and corrects clock skew.
    pub fn client(
        node_id: impl Into<NodeId>,
        log: Arc<L>,
        connection: C,
        config: SyncConfig,
    ) -> SyncHandle {
        Self::spawn(Role::Active, node_id.into(), log, connection, config)
    }

    /// Start the passive side: answers `connect`.
    pub fn server(
        node_id: impl Into<NodeId>,
        log: Arc<L>,
        connection: C,
        config: SyncConfig,
    ) -> SyncHandle {
        Self::spawn(Role::Passive, node_id.into(), log, connection, config)
    }

    /// Load persisted watermarks for the new remote, then catch up.
    async fn on_established(&mut self) {
        let Some(remote) = self.session.remote.clone() else {
            return;
        };

        let watermarks = async {
            let last_sent = self.log.watermark(&remote, WatermarkKind::LastSent).await?;
            let last_received = self
                .log
                .watermark(&remote, WatermarkKind::LastReceived)
                .await?;
            let last_skipped = self
                .log
                .watermark(&remote, WatermarkKind::LastSkipped)
                .await?;
            Ok::<_, tandem_store::StoreError>((last_sent, last_received, last_skipped))
        };
        let (last_sent, last_received, last_skipped) = match watermarks.await {
            Ok(watermarks) => watermarks,
            Err(err) => {
                self.session.report(err.into());
                return;
            }
        };

        self.sent = last_sent.max(last_skipped);
        self.max_watermark = last_sent;
        self.acked = last_sent;
        self.skipped = last_skipped;
        self.session.synced = self.session.synced.max(last_sent);
        self.session.raise_other_synced(last_received);
        debug!(
            node = %self.session.node_id,
            remote = %remote,
            watermark = self.sent,
            "resuming"
        );

        self.flush().await;
    }

    /// Send every local entry past `sent` that passes the outgoing hooks.
    ///
    /// An entry whose hook fails is reported and left out, like a filtered
    /// one; later entries still go out.
    async fn flush(&mut self) {
        if !self.session.is_established() {
            return;
        }
        let Some(remote) = self.session.remote.clone() else {
            return;
        };

        let entries = match self.log.entries_since(self.sent).await {
            Ok(entries) => entries,
            Err(err) => {
                self.session.report(err.into());
                return;
            }
        };
        if entries.is_empty() {
            return;
        }

        let mut newest = self.sent;
        let mut batch: Vec<(u64, Action, Meta)> = Vec::with_capacity(entries.len());
        let mut filtered = 0;

        for entry in entries.into_iter().rev() {
            let added = entry.meta.added;
            newest = newest.max(added);
            if entry.origin.is_from(&remote) {
                continue;
            }

            match self.hooks.outgoing(entry.action, entry.meta).await {
                Ok(Some((action, mut meta))) => {
                    meta.time = self.session.time_fix.outgoing(meta.time);
                    batch.push((added, action, meta));
                }
                Ok(None) => filtered += 1,
                Err(err) => self.session.report(err),
            }

            if !self.session.is_live() {
                debug!(node = %self.session.node_id, "connection changed during outgoing hooks");
                return;
            }
        }

        self.sent = newest;
        self.stats.filtered += filtered;
        if batch.is_empty() {
            self.record_skipped(&remote).await;
            return;
        }

        let messages: Vec<(u64, Vec<(Action, Meta)>)> = match self.batching {
            Batching::Coalesce => vec![(
                newest,
                batch
                    .into_iter()
                    .map(|(_, action, meta)| (action, meta))
                    .collect(),
            )],
            Batching::PerEntry => batch
                .into_iter()
                .map(|(added, action, meta)| (added, vec![(action, meta)]))
                .collect(),
        };

        for (watermark, entries) in messages {
            let count = entries.len() as u64;
            if !self.session.send(&Message::Sync { watermark, entries }).await {
                return;
            }
            self.max_watermark = self.max_watermark.max(watermark);
            self.stats.sent += count;
            debug!(
                node = %self.session.node_id,
                remote = %remote,
                watermark,
                count,
                "sent sync"
            );
        }
        self.record_skipped(&remote).await;
    }

    /// Persist `sent` as `last_skipped` once everything transmitted on this
    /// connection is acknowledged, so entries that were left out are not
    /// evaluated again after a reconnect.
    async fn record_skipped(&mut self, remote: &NodeId) {
        if self.acked < self.max_watermark || self.sent <= self.acked.max(self.skipped) {
            return;
        }
        match self
            .log
            .set_watermark(remote, WatermarkKind::LastSkipped, self.sent)
            .await
        {
            Ok(()) => self.skipped = self.sent,
            Err(err) => self.session.report(err.into()),
        }
    }

    /// Apply an incoming batch and acknowledge it.
    ///
    /// Hooks run for the whole batch before anything is appended, so a
    /// failing hook leaves the log and the watermarks untouched.
    async fn on_sync(&mut self, watermark: u64, entries: Vec<(Action, Meta)>) {
        let Some(remote) = self.session.remote.clone() else {
            return;
        };

        let mut accepted = Vec::with_capacity(entries.len());
        for (action, mut meta) in entries {
            meta.time = self.session.time_fix.incoming(meta.time);
            match self.hooks.incoming(action, meta).await {
                Ok(Some(entry)) => accepted.push(entry),
                Ok(None) => self.stats.filtered += 1,
                Err(err) => {
                    self.session.report(err);
                    return;
                }
            }
        }

        if !self.session.is_live() {
            debug!(node = %self.session.node_id, "connection changed during incoming hooks");
            return;
        }

        let mut added = 0;
        for (action, meta) in accepted {
            match self
                .log
                .append(action, Some(meta), Origin::Remote(remote.clone()))
                .await
            {
                Ok(AppendResult::Added(_)) => added += 1,
                Ok(AppendResult::Duplicate) => self.stats.duplicates += 1,
                Err(err) => {
                    self.session.report(err.into());
                    return;
                }
            }
        }
        self.stats.received += added;

        self.session.raise_other_synced(watermark);
        if let Err(err) = self
            .log
            .set_watermark(&remote, WatermarkKind::LastReceived, self.session.other_synced)
            .await
        {
            self.session.report(err.into());
            return;
        }
        info!(
            node = %self.session.node_id,
            remote = %remote,
            watermark,
            count = added,
            "applied sync"
        );

        self.session.send(&Message::Synced(watermark)).await;
    }

    async fn on_synced(&mut self, watermark: u64) {
        let Some(remote) = self.session.remote.clone() else {
            return;
        };
        if watermark > self.max_watermark {
            warn!(
                node = %self.session.node_id,
                remote = %remote,
                watermark,
                max = self.max_watermark,
                "ignoring synced beyond anything sent"
            );
            return;
        }
        if watermark <= self.acked {
            return;
        }

        self.acked = watermark;
        self.session.synced = self.session.synced.max(watermark);
        if let Err(err) = self
            .log
            .set_watermark(&remote, WatermarkKind::LastSent, watermark)
            .await
        {
            self.session.report(err.into());
            return;
        }
        self.record_skipped(&remote).await;
    }

    async fn on_message(&mut self, gen: u64, raw: serde_json::Value) {
        match self.session.handle(gen, raw).await {
            Step::Done => {}
            Step::Established => self.on_established().await,
            Step::Forward(Message::Sync { watermark, entries }) => {
                self.on_sync(watermark, entries).await
            }
            Step::Forward(Message::Synced(watermark)) => self.on_synced(watermark).await,
            Step::Forward(other) => {
                self.session
                    .fail(SyncError::UnknownMessage(other.kind().to_owned()))
                    .await
            }
        }
    }
}

#[async_trait]
impl<L, C> Driver for SyncSession<L, C>
where
    L: Log + ?Sized + 'static,
    C: Connection,
{
    async fn on_event(&mut self, event: Event) {
        match self.session.on_lifecycle(event).await {
            None => {}
            Some(Event::Message(gen, raw)) => self.on_message(gen, raw).await,
            Some(Event::Appended) => self.flush().await,
            Some(_) => {}
        }
    }

    fn status(&self) -> SyncStatus {
        self.session.status(self.stats)
    }
}
