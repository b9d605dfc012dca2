//! Peer address registry: logical rover id -> last observed transport address.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::id::RoverId;

/// Learned opportunistically from received routing packets.
/// Entries are never evicted: the id space is 256 wide and a rover that
/// comes back simply overwrites its old address.
#[derive(Debug, Default)]
pub struct PeerAddressRegistry {
    addrs: HashMap<RoverId, SocketAddr>,
}

impl PeerAddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the address `peer` was last seen at.
    pub fn observe(&mut self, peer: RoverId, addr: SocketAddr) {
        self.addrs.insert(peer, addr);
    }

    pub fn resolve(&self, peer: RoverId) -> Option<SocketAddr> {
        self.addrs.get(&peer).copied()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_overwrites() {
        let mut r = PeerAddressRegistry::new();
        let p = RoverId(2);
        assert_eq!(r.resolve(p), None);
        r.observe(p, "172.18.0.2:40000".parse().unwrap());
        r.observe(p, "172.18.0.9:40001".parse().unwrap());
        assert_eq!(r.resolve(p), Some("172.18.0.9:40001".parse().unwrap()));
        assert_eq!(r.len(), 1);
    }
}
