//! Metadata attached to every action.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::types::NodeId;

/// Globally unique action identifier: `(time, node, seq)`.
///
/// `seq` disambiguates ids generated by the same node within one clock
/// tick, and `node` keeps ids unique when two hosts' clocks collide.
/// Serialized as a three element array, e.g. `[1, "test1", 0]`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i64, NodeId, u32)", into = "(i64, NodeId, u32)")]
pub struct MetaId {
    /// Logical time at the origin node when the id was generated.
    pub time: i64,
    /// Node that generated the id.
    pub node: NodeId,
    /// Per-time counter.
    pub seq: u32,
}

impl MetaId {
    /// Create a new id.
    pub fn new(time: i64, node: impl Into<NodeId>, seq: u32) -> Self {
        Self {
            time,
            node: node.into(),
            seq,
        }
    }
}

impl From<(i64, NodeId, u32)> for MetaId {
    fn from((time, node, seq): (i64, NodeId, u32)) -> Self {
        Self { time, node, seq }
    }
}

impl From<MetaId> for (i64, NodeId, u32) {
    fn from(id: MetaId) -> Self {
        (id.time, id.node, id.seq)
    }
}

impl Ord for MetaId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.node.cmp(&other.node))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for MetaId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for MetaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.time, self.node, self.seq)
    }
}

impl fmt::Display for MetaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.time, self.node, self.seq)
    }
}

/// Metadata of one log entry.
///
/// `added` is assigned by the local log at append time and is never
/// transmitted; it is skipped during serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Unique action id.
    pub id: MetaId,
    /// Logical timestamp, possibly corrected for clock skew.
    pub time: i64,
    /// Local sequence number (0 until appended).
    #[serde(skip)]
    pub added: u64,
}

impl Meta {
    /// Create metadata for an id, using the id's time as the timestamp.
    pub fn new(id: MetaId) -> Self {
        let time = id.time;
        Self { id, time, added: 0 }
    }

    /// Override the timestamp.
    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    /// Creation order: timestamp first, then id.
    pub fn created_cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}
