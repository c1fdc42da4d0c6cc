//! SQLite implementation of the Log trait.
//!
//! This is the durable backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. Actions are stored as CBOR.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use tandem_core::{Action, Clock, IdGenerator, Meta, MetaId, NodeId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    AppendListener, AppendResult, Entry, EntryOrder, Listeners, Log, Origin, WatermarkKind,
};

const SELECT_ENTRY: &str =
    "SELECT added, id_time, id_node, id_seq, time, action, origin FROM entries";

/// SQLite-based log implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteLog {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
    ids: IdGenerator,
    listeners: Listeners,
}

impl SqliteLog {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(
        path: impl AsRef<Path>,
        node: impl Into<NodeId>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, node.into(), clock)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory(node: impl Into<NodeId>, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, node.into(), clock)
    }

    fn from_connection(mut conn: Connection, node: NodeId, clock: Arc<dyn Clock>) -> Result<Self> {
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ids: IdGenerator::new(node, clock),
            listeners: Listeners::default(),
        })
    }

    /// Run a blocking operation on the connection.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// A row before its CBOR action is decoded.
type RawEntry = (Meta, Origin, Vec<u8>);

// Helper to convert a row to its raw parts
fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    let added: i64 = row.get("added")?;
    let id_seq: i64 = row.get("id_seq")?;
    let origin: Option<String> = row.get("origin")?;

    let meta = Meta {
        id: MetaId {
            time: row.get("id_time")?,
            node: NodeId::new(row.get::<_, String>("id_node")?),
            seq: id_seq as u32,
        },
        time: row.get("time")?,
        added: added as u64,
    };
    let origin = origin
        .map(|o| Origin::Remote(NodeId::new(o)))
        .unwrap_or(Origin::Local);

    Ok((meta, origin, row.get("action")?))
}

fn decode_action(bytes: &[u8]) -> Result<Action> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode_action(action: &Action) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(action, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn query_entries(conn: &Connection, sql: &str, since: i64) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![since], row_to_raw)?;

    let mut entries = Vec::new();
    for row in rows {
        let (meta, origin, action_cbor) = row?;
        entries.push(Entry {
            action: decode_action(&action_cbor)?,
            meta,
            origin,
        });
    }
    Ok(entries)
}

#[async_trait]
impl Log for SqliteLog {
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
        let action_cbor = encode_action(&action)?;
        let origin_column = match &origin {
            Origin::Local => None,
            Origin::Remote(node) => Some(node.as_str().to_owned()),
        };
        let row_meta = meta.clone();

        let added = self
            .blocking(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO entries (id_time, id_node, id_seq, time, action, origin)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row_meta.id.time,
                        row_meta.id.node.as_str(),
                        row_meta.id.seq as i64,
                        row_meta.time,
                        action_cbor,
                        origin_column,
                    ],
                )?;

                if changed == 0 {
                    return Ok(None);
                }
                Ok(Some(conn.last_insert_rowid() as u64))
            })
            .await?;

        let Some(added) = added else {
            return Ok(AppendResult::Duplicate);
        };
        meta.added = added;

        self.listeners.notify(&Entry {
            action,
            meta: meta.clone(),
            origin,
        });
        Ok(AppendResult::Added(meta))
    }

    async fn entries_since(&self, since: u64) -> Result<Vec<Entry>> {
        let sql = format!("{SELECT_ENTRY} WHERE added > ?1 ORDER BY added DESC");
        self.blocking(move |conn| query_entries(conn, &sql, since as i64))
            .await
    }

    async fn entries(&self, order: EntryOrder) -> Result<Vec<Entry>> {
        let ordering = match order {
            EntryOrder::Added => "added DESC",
            EntryOrder::Created => "time DESC, id_time DESC, id_node DESC, id_seq DESC",
        };
        let sql = format!("{SELECT_ENTRY} WHERE added > ?1 ORDER BY {ordering}");
        self.blocking(move |conn| query_entries(conn, &sql, 0)).await
    }

    async fn last_added(&self) -> Result<u64> {
        self.blocking(|conn| {
            let last: i64 =
                conn.query_row("SELECT COALESCE(MAX(added), 0) FROM entries", [], |row| {
                    row.get(0)
                })?;
            Ok(last as u64)
        })
        .await
    }

    async fn watermark(&self, remote: &NodeId, kind: WatermarkKind) -> Result<u64> {
        let remote = remote.as_str().to_owned();

        self.blocking(move |conn| {
            let value: Option<i64> = conn
                .query_row(
                    "SELECT value FROM watermarks WHERE remote = ?1 AND kind = ?2",
                    params![remote, kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value.unwrap_or(0) as u64)
        })
        .await
    }

    async fn set_watermark(
        &self,
        remote: &NodeId,
        kind: WatermarkKind,
        value: u64,
    ) -> Result<()> {
        let remote = remote.as_str().to_owned();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO watermarks (remote, kind, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(remote, kind) DO UPDATE SET value = excluded.value",
                params![remote, kind.as_str(), value as i64],
            )?;
            Ok(())
        })
        .await
    }

    fn subscribe(&self, listener: AppendListener) {
        self.listeners.push(listener);
    }
}

impl std::fmt::Debug for SqliteLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLog")
            .field("node", self.ids.node())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LogExt;
    use serde_json::json;
    use tandem_core::{ManualClock, TestClock};

    #[tokio::test]
    async fn test_sqlite_append_and_read() {
        let log = SqliteLog::open_memory("test1", Arc::new(TestClock::new())).unwrap();

        let action =
            Action::new(json!({ "type": "a", "nested": { "n": [1, 2.5, null] } })).unwrap();
        let result = log.add(action.clone()).await.unwrap();
        let meta = result.meta().unwrap();
        assert_eq!(meta.added, 1);
        assert_eq!(meta.id, MetaId::new(1, "test1", 0));

        let entries = log.entries_since(0).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, action);
        assert_eq!(entries[0].meta, *meta);
        assert_eq!(entries[0].origin, Origin::Local);
    }

    #[tokio::test]
    async fn test_sqlite_idempotent() {
        let log = SqliteLog::open_memory("test1", Arc::new(TestClock::new())).unwrap();
        let meta = Meta::new(MetaId::new(3, "remote", 0));

        let first = log
            .append(Action::of_type("a"), Some(meta.clone()), Origin::Remote(NodeId::new("remote")))
            .await
            .unwrap();
        let second = log
            .append(Action::of_type("a"), Some(meta), Origin::Remote(NodeId::new("remote")))
            .await
            .unwrap();

        assert!(matches!(first, AppendResult::Added(_)));
        assert_eq!(second, AppendResult::Duplicate);
        assert_eq!(log.last_added().await.unwrap(), 1);

        let entries = log.entries_since(0).await.unwrap();
        assert!(entries[0].origin.is_from(&NodeId::new("remote")));
    }

    #[tokio::test]
    async fn test_sqlite_orders() {
        let log = SqliteLog::open_memory("n", Arc::new(ManualClock::at(50))).unwrap();
        log.add_with_meta(Action::of_type("b"), Meta::new(MetaId::new(20, "n", 0)))
            .await
            .unwrap();
        log.add_with_meta(Action::of_type("a"), Meta::new(MetaId::new(10, "n", 0)))
            .await
            .unwrap();
        log.add(Action::of_type("c")).await.unwrap();

        assert_eq!(
            log.actions().await.unwrap(),
            vec![Action::of_type("c"), Action::of_type("b"), Action::of_type("a")]
        );

        let since: Vec<u64> = log
            .entries_since(1)
            .await
            .unwrap()
            .iter()
            .map(|e| e.meta.added)
            .collect();
        assert_eq!(since, vec![3, 2]);
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        let remote = NodeId::new("server");

        {
            let log = SqliteLog::open(&path, "client", Arc::new(TestClock::new())).unwrap();
            log.add(Action::of_type("a")).await.unwrap();
            log.set_watermark(&remote, WatermarkKind::LastSent, 1).await.unwrap();
            log.set_watermark(&remote, WatermarkKind::LastSent, 2).await.unwrap();
        }

        let log = SqliteLog::open(&path, "client", Arc::new(ManualClock::at(100))).unwrap();
        assert_eq!(log.last_added().await.unwrap(), 1);
        assert_eq!(log.watermark(&remote, WatermarkKind::LastSent).await.unwrap(), 2);
        assert_eq!(log.watermark(&remote, WatermarkKind::LastReceived).await.unwrap(), 0);

        let next = log.add(Action::of_type("b")).await.unwrap();
        assert_eq!(next.meta().unwrap().added, 2);
    }

    #[tokio::test]
    async fn test_sqlite_notifies_listeners() {
        let log = SqliteLog::open_memory("n", Arc::new(TestClock::new())).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        log.subscribe(Box::new(move |entry: &Entry| tx.send(entry.meta.added).is_ok()));

        log.add(Action::of_type("a")).await.unwrap();
        assert_eq!(rx.recv().await, Some(1));
    }
}
