//! Rover wire protocol: routing packet and transfer packet types, version and constants.

use std::net::Ipv4Addr;

use crate::id::RoverId;

/// RIP version carried in every routing header.
pub const PROTOCOL_VERSION: u8 = 2;

/// Metric meaning "unreachable".
pub const METRIC_UNREACHABLE: u32 = 16;

/// Address family identifier for IPv4 routes.
pub const ADDRESS_FAMILY_IPV4: u16 = 2;

/// Route tag stamped on every locally originated entry.
pub const ROUTE_TAG: u16 = 1;

/// Every rover owns a /24.
pub const SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Routing packet command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Header only; sent while the table is still empty to solicit responses.
    Request,
    /// Header followed by the full table.
    Response,
}

impl Command {
    pub fn as_byte(self) -> u8 {
        match self {
            Command::Request => 1,
            Command::Response => 2,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Command::Request),
            2 => Some(Command::Response),
            _ => None,
        }
    }
}

/// One routing table entry (RTE); 20 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub address_family: u16,
    pub route_tag: u16,
    pub destination: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
}

impl RouteEntry {
    /// Entry for `destination` reached through `next_hop` at `metric`, with the standard family, tag and mask.
    pub fn new(destination: RoverId, next_hop: RoverId, metric: u32) -> Self {
        Self {
            address_family: ADDRESS_FAMILY_IPV4,
            route_tag: ROUTE_TAG,
            destination: destination.to_ipv4(),
            subnet_mask: SUBNET_MASK,
            next_hop: next_hop.to_ipv4(),
            metric: metric.min(METRIC_UNREACHABLE),
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.metric >= METRIC_UNREACHABLE
    }

    /// Zeroed record marking the end of data in a zero-padded buffer.
    pub(crate) fn is_end_marker(&self) -> bool {
        self.address_family == 0
            && self.route_tag == 0
            && self.destination.is_unspecified()
            && self.subnet_mask.is_unspecified()
    }
}

/// A decoded routing packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdate {
    pub command: Command,
    pub version: u8,
    pub must_be_zero: u8,
    pub sender: RoverId,
    pub entries: Vec<RouteEntry>,
}

/// One byte of a file transfer (or its acknowledgment); 11 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferDescriptor {
    pub end_of_stream: bool,
    pub payload: u8,
    pub ack_echo: u8,
    /// Alternating bit distinguishing a retransmission from a new byte with the same value.
    pub sequence: bool,
    pub source: RoverId,
    pub destination: RoverId,
}

impl TransferDescriptor {
    /// Data packet carrying `payload` from `source` to `destination`.
    pub fn data(source: RoverId, destination: RoverId, payload: u8, sequence: bool) -> Self {
        Self {
            end_of_stream: false,
            payload,
            ack_echo: 0,
            sequence,
            source,
            destination,
        }
    }

    /// Final packet of a stream; its payload is not part of the delivered bytes.
    pub fn end_of_stream(source: RoverId, destination: RoverId, sequence: bool) -> Self {
        Self {
            end_of_stream: true,
            payload: 0,
            ack_echo: 0,
            sequence,
            source,
            destination,
        }
    }

    /// Acknowledgment for this packet, travelling back to its source.
    pub fn ack(&self) -> Self {
        Self {
            end_of_stream: self.end_of_stream,
            payload: 0,
            ack_echo: self.payload,
            sequence: self.sequence,
            source: self.destination,
            destination: self.source,
        }
    }

    /// True if `ack` acknowledges this packet.
    pub fn is_acked_by(&self, ack: &TransferDescriptor) -> bool {
        ack.source == self.destination
            && ack.destination == self.source
            && ack.ack_echo == self.payload
            && ack.sequence == self.sequence
            && ack.end_of_stream == self.end_of_stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes() {
        assert_eq!(Command::from_byte(1), Some(Command::Request));
        assert_eq!(Command::from_byte(2), Some(Command::Response));
        assert_eq!(Command::from_byte(3), None);
        assert_eq!(Command::Response.as_byte(), 2);
    }

    #[test]
    fn route_entry_metric_is_capped() {
        let e = RouteEntry::new(RoverId(3), RoverId(2), 40);
        assert_eq!(e.metric, METRIC_UNREACHABLE);
        assert!(e.is_unreachable());
    }

    #[test]
    fn ack_matches_only_its_packet() {
        let pkt = TransferDescriptor::data(RoverId(1), RoverId(3), 0x41, false);
        let ack = pkt.ack();
        assert_eq!(ack.source, RoverId(3));
        assert_eq!(ack.destination, RoverId(1));
        assert_eq!(ack.ack_echo, 0x41);
        assert!(pkt.is_acked_by(&ack));

        let next = TransferDescriptor::data(RoverId(1), RoverId(3), 0x41, true);
        assert!(!next.is_acked_by(&ack));
    }
}
