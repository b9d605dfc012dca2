//! Host-driven routing context: the host feeds received datagrams and timer ticks,
//! the router returns what to send. One per rover; no I/O.

use std::net::SocketAddr;

use tracing::{debug, info};

use crate::config::Config;
use crate::id::RoverId;
use crate::liveness::{now_secs, LivenessTracker};
use crate::peers::PeerAddressRegistry;
use crate::protocol::{Command, RouteUpdate};
use crate::table::RoutingTable;
use crate::transfer::Channel;
use crate::wire::{self, WireError};

/// Routing state of one rover: table, neighbor liveness and observed peer addresses.
pub struct Router {
    id: RoverId,
    config: Config,
    table: RoutingTable,
    liveness: LivenessTracker,
    peers: PeerAddressRegistry,
}

/// What a received routing datagram did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEvent {
    /// Our own multicast looped back; ignored.
    OwnEcho,
    Received {
        sender: RoverId,
        /// The table changed; host should print it.
        changed: bool,
        /// Sender asked for our table (REQUEST); host should announce now.
        solicited: bool,
    },
}

impl Router {
    pub fn new(id: RoverId, config: Config) -> Self {
        let liveness = LivenessTracker::new(config.peer_timeout());
        Self {
            id,
            config,
            table: RoutingTable::new(id),
            liveness,
            peers: PeerAddressRegistry::new(),
        }
    }

    pub fn id(&self) -> RoverId {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    pub fn peers(&self) -> &PeerAddressRegistry {
        &self.peers
    }

    pub fn on_route_datagram(
        &mut self,
        bytes: &[u8],
        from: SocketAddr,
    ) -> Result<RouteEvent, WireError> {
        self.on_route_datagram_at(bytes, from, now_secs())
    }

    /// Process a routing datagram received from `from` at Unix time `now`.
    pub fn on_route_datagram_at(
        &mut self,
        bytes: &[u8],
        from: SocketAddr,
        now: u64,
    ) -> Result<RouteEvent, WireError> {
        let update = wire::decode_route_update(bytes)?;
        if update.sender == self.id {
            return Ok(RouteEvent::OwnEcho);
        }
        Ok(self.apply_update(&update, from, now))
    }

    fn apply_update(&mut self, update: &RouteUpdate, from: SocketAddr, now: u64) -> RouteEvent {
        let sender = update.sender;
        self.liveness.touch_at(sender, now);
        self.peers.observe(sender, from);
        let greeted = self.table.apply_neighbor_greeting(sender);
        let merged = self.table.merge_advertisement(sender, &update.entries);
        debug!(
            rover = %self.id,
            %sender,
            entries = update.entries.len(),
            "routing update received"
        );
        RouteEvent::Received {
            sender,
            changed: greeted || merged,
            solicited: update.command == Command::Request,
        }
    }

    /// Next announcement: REQUEST while the table is empty, otherwise RESPONSE with the full table.
    pub fn announcement(&self) -> Vec<u8> {
        let command = if self.table.is_empty() {
            Command::Request
        } else {
            Command::Response
        };
        wire::encode_route_update(self.id, command, &self.table.snapshot())
    }

    pub fn sweep(&mut self) -> Vec<RoverId> {
        self.sweep_at(now_secs())
    }

    /// Expire silent neighbors and mark their routes unreachable. Returns the expired peers.
    pub fn sweep_at(&mut self, now: u64) -> Vec<RoverId> {
        let expired = self.liveness.sweep_at(now);
        for &peer in &expired {
            if self.table.mark_unreachable(peer) {
                info!(rover = %self.id, %peer, "neighbor timed out, marked unreachable");
            }
        }
        expired
    }

    /// Neighbor through which `destination` is currently reached.
    pub fn next_hop_id(&self, destination: RoverId) -> Result<RoverId, RouteError> {
        let entry = self
            .table
            .lookup(destination)
            .ok_or(RouteError::NoRoute(destination))?;
        if entry.is_unreachable() {
            return Err(RouteError::Unreachable(destination));
        }
        RoverId::from_ipv4(entry.next_hop).ok_or(RouteError::ForeignNextHop(entry.next_hop))
    }

    /// Observed transport address of the next hop toward `destination`.
    pub fn next_hop(&self, destination: RoverId) -> Result<SocketAddr, RouteError> {
        let hop = self.next_hop_id(destination)?;
        self.peers
            .resolve(hop)
            .ok_or(RouteError::UnknownAddress(hop))
    }

    /// Where to send a transfer packet bound for `destination` on `channel`.
    pub fn transfer_target(
        &self,
        destination: RoverId,
        channel: Channel,
    ) -> Result<SocketAddr, RouteError> {
        let mut addr = self.next_hop(destination)?;
        addr.set_port(match channel {
            Channel::Data => self.config.data_port,
            Channel::Ack => self.config.ack_port,
        });
        Ok(addr)
    }

    pub fn render_table(&self) -> String {
        self.table.render(&self.peers)
    }
}

/// Next hop could not be resolved. Recoverable: drop the send and retry after the next route update.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("no route to {0}")]
    NoRoute(RoverId),
    #[error("{0} is unreachable")]
    Unreachable(RoverId),
    #[error("next hop {0} is not a rover address")]
    ForeignNextHop(std::net::Ipv4Addr),
    #[error("no transport address observed for next hop {0}")]
    UnknownAddress(RoverId),
}
