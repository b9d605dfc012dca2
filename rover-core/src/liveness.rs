//! Neighbor liveness: last-seen timestamps and the periodic expiry sweep.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::id::RoverId;

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Tracks when each neighbor was last heard from.
pub struct LivenessTracker {
    last_seen: HashMap<RoverId, u64>,
    timeout_secs: u64,
}

impl LivenessTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Record that `peer` was heard from now.
    pub fn touch(&mut self, peer: RoverId) {
        self.touch_at(peer, now_secs());
    }

    /// Record that `peer` was heard from at `now` (Unix seconds).
    pub fn touch_at(&mut self, peer: RoverId, now: u64) {
        self.last_seen.insert(peer, now);
    }

    pub fn sweep(&mut self) -> Vec<RoverId> {
        self.sweep_at(now_secs())
    }

    /// Remove and return every peer whose age at `now` exceeds the timeout.
    /// A returned peer is not reported again until it is touched again.
    pub fn sweep_at(&mut self, now: u64) -> Vec<RoverId> {
        let timeout = self.timeout_secs;
        let mut expired: Vec<RoverId> = self
            .last_seen
            .iter()
            .filter(|(_, &seen)| now.saturating_sub(seen) > timeout)
            .map(|(&peer, _)| peer)
            .collect();
        expired.sort();
        for peer in &expired {
            self.last_seen.remove(peer);
        }
        expired
    }

    pub fn last_seen(&self, peer: RoverId) -> Option<u64> {
        self.last_seen.get(&peer).copied()
    }

    pub fn is_tracked(&self, peer: RoverId) -> bool {
        self.last_seen.contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> LivenessTracker {
        LivenessTracker::new(Duration::from_secs(10))
    }

    #[test]
    fn expires_once_after_timeout() {
        let mut t = tracker();
        let p = RoverId(4);
        t.touch_at(p, 1_000);
        assert!(t.sweep_at(1_010).is_empty());
        assert_eq!(t.sweep_at(1_011), vec![p]);
        assert!(t.sweep_at(1_020).is_empty());
        assert!(!t.is_tracked(p));
    }

    #[test]
    fn one_missed_announcement_is_tolerated() {
        let mut t = tracker();
        let p = RoverId(4);
        t.touch_at(p, 0);
        // Next announcement at 5 is lost; the one at 10 arrives.
        t.touch_at(p, 10);
        assert!(t.sweep_at(15).is_empty());
        assert_eq!(t.last_seen(p), Some(10));
    }

    #[test]
    fn touch_after_expiry_tracks_again() {
        let mut t = tracker();
        let p = RoverId(9);
        t.touch_at(p, 0);
        assert_eq!(t.sweep_at(20), vec![p]);
        t.touch_at(p, 21);
        assert!(t.is_tracked(p));
        assert_eq!(t.sweep_at(40), vec![p]);
    }

    #[test]
    fn only_stale_peers_expire() {
        let mut t = tracker();
        t.touch_at(RoverId(1), 0);
        t.touch_at(RoverId(2), 8);
        t.touch_at(RoverId(3), 3);
        assert_eq!(t.sweep_at(14), vec![RoverId(1), RoverId(3)]);
        assert_eq!(t.len(), 1);
    }
}
