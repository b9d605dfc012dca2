//! Routing table: one entry per destination, distance-vector merge rules.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::id::RoverId;
use crate::peers::PeerAddressRegistry;
use crate::protocol::{RouteEntry, METRIC_UNREACHABLE, SUBNET_MASK};

/// Known destinations of one rover. Entries are never removed, only marked unreachable,
/// so the index into `entries` is stable.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    self_addr: Ipv4Addr,
    entries: Vec<RouteEntry>,
    index: HashMap<Ipv4Addr, usize>,
}

impl RoutingTable {
    pub fn new(self_id: RoverId) -> Self {
        Self {
            self_addr: self_id.to_ipv4(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, destination: Ipv4Addr) -> Option<&RouteEntry> {
        self.index.get(&destination).map(|&i| &self.entries[i])
    }

    pub fn lookup(&self, destination: RoverId) -> Option<&RouteEntry> {
        self.get(destination.to_ipv4())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    /// Copy of the current entries, in insertion order.
    pub fn snapshot(&self) -> Vec<RouteEntry> {
        self.entries.clone()
    }

    fn insert(&mut self, entry: RouteEntry) {
        self.index.insert(entry.destination, self.entries.len());
        self.entries.push(entry);
    }

    /// A packet arrived directly from `sender`: it is one hop away through itself.
    pub fn apply_neighbor_greeting(&mut self, sender: RoverId) -> bool {
        let addr = sender.to_ipv4();
        match self.index.get(&addr) {
            Some(&i) => {
                let e = &mut self.entries[i];
                if e.next_hop == addr && e.metric == 1 {
                    return false;
                }
                e.next_hop = addr;
                e.metric = 1;
                true
            }
            None => {
                self.insert(RouteEntry::new(sender, sender, 1));
                true
            }
        }
    }

    /// Merge the table advertised by `sender`. Returns true if any entry was added or changed.
    ///
    /// - Entry already routed through `sender`: take its metric + 1, even if worse.
    /// - Entry routed elsewhere: switch to `sender` if it reports unreachable or a strictly
    ///   shorter path.
    /// - Unknown destination: learn it through `sender`, unreachable or not.
    ///
    /// Entries for this rover and for `sender` itself are skipped; the direct link to `sender`
    /// is owned by [`RoutingTable::apply_neighbor_greeting`].
    pub fn merge_advertisement(&mut self, sender: RoverId, incoming: &[RouteEntry]) -> bool {
        let sender_addr = sender.to_ipv4();
        let mut changed = false;
        for inc in incoming {
            let dest = inc.destination;
            if dest == self.self_addr || dest == sender_addr {
                continue;
            }
            let offered = inc.metric.saturating_add(1).min(METRIC_UNREACHABLE);
            match self.index.get(&dest) {
                Some(&i) => {
                    let e = &mut self.entries[i];
                    if e.next_hop == sender_addr {
                        if e.metric != offered {
                            e.metric = offered;
                            changed = true;
                        }
                    } else if inc.metric >= METRIC_UNREACHABLE {
                        if e.metric < METRIC_UNREACHABLE {
                            e.metric = METRIC_UNREACHABLE;
                            e.next_hop = sender_addr;
                            changed = true;
                        }
                    } else if offered < e.metric {
                        e.metric = offered;
                        e.next_hop = sender_addr;
                        changed = true;
                    }
                }
                None => {
                    self.insert(RouteEntry {
                        address_family: inc.address_family,
                        route_tag: inc.route_tag,
                        destination: dest,
                        subnet_mask: inc.subnet_mask,
                        next_hop: sender_addr,
                        metric: offered,
                    });
                    changed = true;
                }
            }
        }
        changed
    }

    /// Set the metric for `destination` to unreachable. Idempotent; returns true on change.
    pub fn mark_unreachable(&mut self, destination: RoverId) -> bool {
        match self.index.get(&destination.to_ipv4()) {
            Some(&i) if self.entries[i].metric != METRIC_UNREACHABLE => {
                self.entries[i].metric = METRIC_UNREACHABLE;
                true
            }
            _ => false,
        }
    }

    /// Console view: this rover at cost 0 followed by every entry in CIDR notation.
    /// Next hops are shown by their observed transport address when one is known.
    pub fn render(&self, peers: &PeerAddressRegistry) -> String {
        let mut out = format!("{:<20}{:<20}{}\n", "Address", "NextHop", "Cost");
        out.push_str(&"=".repeat(43));
        out.push('\n');
        out.push_str(&format!(
            "{:<20}{:<20}0\n",
            cidr(self.self_addr, SUBNET_MASK),
            self.self_addr
        ));
        for e in &self.entries {
            let hop = RoverId::from_ipv4(e.next_hop)
                .and_then(|id| peers.resolve(id))
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| e.next_hop.to_string());
            out.push_str(&format!(
                "{:<20}{:<20}{}\n",
                cidr(e.destination, e.subnet_mask),
                hop,
                e.metric
            ));
        }
        out
    }
}

fn cidr(addr: Ipv4Addr, mask: Ipv4Addr) -> String {
    match prefix_len(mask) {
        Ok(len) => format!("{}/{}", addr, len),
        Err(_) => format!("{}/{}", addr, mask),
    }
}

/// Prefix length of a contiguous subnet mask (255.255.255.0 -> 24).
pub fn prefix_len(mask: Ipv4Addr) -> Result<u8, MaskError> {
    let bits = u32::from(mask);
    let ones = bits.leading_ones();
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return Err(MaskError(mask));
    }
    Ok(ones as u8)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("non-contiguous subnet mask {0}")]
pub struct MaskError(pub Ipv4Addr);
