//! Clocks and id generation.
//!
//! Every source of time is injected through the [`Clock`] trait so tests
//! can run against deterministic time instead of the wall clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::meta::MetaId;
use crate::types::NodeId;

/// A source of logical time in milliseconds.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> i64;
}

/// Wall clock: milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Deterministic clock that advances by one on every call.
///
/// Clones share the same counter, so several logs driven by one
/// `TestClock` observe a single global time line: 1, 2, 3, ...
#[derive(Debug, Clone, Default)]
pub struct TestClock {
    last: Arc<AtomicI64>,
}

impl TestClock {
    /// Create a clock whose first reading is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent value handed out.
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}

impl Clock for TestClock {
    fn now(&self) -> i64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Clock that returns whatever it was last set to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    pub fn at(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Generates unique [`MetaId`]s for one node.
///
/// Two ids generated within the same clock tick get increasing `seq`
/// values; a clock that goes backwards is clamped to the last seen time
/// so ids stay strictly increasing.
pub struct IdGenerator {
    node: NodeId,
    clock: Arc<dyn Clock>,
    last: Mutex<(i64, u32)>,
}

impl IdGenerator {
    /// Create a generator for `node` reading time from `clock`.
    pub fn new(node: NodeId, clock: Arc<dyn Clock>) -> Self {
        Self {
            node,
            clock,
            last: Mutex::new((i64::MIN, 0)),
        }
    }

    /// The node whose ids this generator produces.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Produce the next id.
    pub fn next_id(&self) -> MetaId {
        let now = self.clock.now();
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let (time, seq) = if now > last.0 {
            (now, 0)
        } else {
            (last.0, last.1 + 1)
        };
        *last = (time, seq);

        MetaId {
            time,
            node: self.node.clone(),
            seq,
        }
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").field("node", &self.node).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_clock_is_shared() {
        let clock = TestClock::new();
        let other = clock.clone();
        assert_eq!(clock.now(), 1);
        assert_eq!(other.now(), 2);
        assert_eq!(clock.last(), 2);
    }

    #[test]
    fn test_ids_follow_test_clock() {
        let clock = TestClock::new();
        let first = IdGenerator::new(NodeId::new("test1"), Arc::new(clock.clone()));
        let second = IdGenerator::new(NodeId::new("test2"), Arc::new(clock));

        assert_eq!(first.next_id(), MetaId::new(1, "test1", 0));
        assert_eq!(second.next_id(), MetaId::new(2, "test2", 0));
    }

    #[test]
    fn test_same_tick_increments_seq() {
        let clock = ManualClock::at(10);
        let ids = IdGenerator::new(NodeId::new("n"), Arc::new(clock.clone()));

        assert_eq!(ids.next_id(), MetaId::new(10, "n", 0));
        assert_eq!(ids.next_id(), MetaId::new(10, "n", 1));

        clock.set(5);
        assert_eq!(ids.next_id(), MetaId::new(10, "n", 2));

        clock.set(11);
        assert_eq!(ids.next_id(), MetaId::new(11, "n", 0));
    }

    proptest::proptest! {
        #[test]
        fn test_ids_strictly_increase(steps in proptest::collection::vec(-3i64..=3, 1..64)) {
            let clock = ManualClock::at(0);
            let ids = IdGenerator::new(NodeId::new("n"), Arc::new(clock.clone()));
            let mut prev = ids.next_id();
            for step in steps {
                clock.advance(step);
                let next = ids.next_id();
                proptest::prop_assert!(next > prev);
                prev = next;
            }
        }
    }
}
