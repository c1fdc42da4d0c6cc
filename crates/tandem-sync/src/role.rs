//! Role specializations and clock-skew correction.

/// Which side of the connection an engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends `connect` on every connect and corrects the peer's clock.
    Active,
    /// Waits for `connect` and answers with `connected`.
    Passive,
}

impl Role {
    pub fn initiates_handshake(self) -> bool {
        matches!(self, Role::Active)
    }

    pub fn computes_time_fix(self) -> bool {
        matches!(self, Role::Active)
    }
}

/// Per-connection clock offset: local clock minus peer clock.
///
/// Outgoing timestamps are moved into the peer's frame by subtracting the
/// offset; incoming ones are moved into the local frame by adding it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeFix(i64);

impl TimeFix {
    /// No correction.
    pub const NONE: TimeFix = TimeFix(0);

    pub fn new(offset: i64) -> Self {
        Self(offset)
    }

    /// Estimate from a handshake round trip.
    ///
    /// The peer's reading is assumed to be taken halfway between sending
    /// `connect` at `sent_at` and receiving `connected` at `received_at`.
    pub fn estimate(sent_at: i64, received_at: i64, peer_time: i64) -> Self {
        let midpoint = sent_at.saturating_add(received_at.saturating_sub(sent_at) / 2);
        Self(midpoint.saturating_sub(peer_time))
    }

    pub fn offset(self) -> i64 {
        self.0
    }

    /// Convert a local timestamp for sending.
    pub fn outgoing(self, time: i64) -> i64 {
        time.saturating_sub(self.0)
    }

    /// Convert a received timestamp into local time.
    pub fn incoming(self, time: i64) -> i64 {
        time.saturating_add(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_initiates() {
        assert!(Role::Active.initiates_handshake());
        assert!(Role::Active.computes_time_fix());
        assert!(!Role::Passive.initiates_handshake());
        assert!(!Role::Passive.computes_time_fix());
    }

    #[test]
    fn test_time_fix_directions() {
        let fix = TimeFix::new(100);
        assert_eq!(fix.outgoing(101), 1);
        assert_eq!(fix.incoming(2), 102);
        assert_eq!(TimeFix::NONE.outgoing(7), 7);
    }

    #[test]
    fn test_estimate_uses_round_trip_midpoint() {
        assert_eq!(TimeFix::estimate(200, 200, 100).offset(), 100);
        assert_eq!(TimeFix::estimate(1000, 1010, 500).offset(), 505);
        assert_eq!(TimeFix::estimate(50, 50, 80).offset(), -30);
    }
}
