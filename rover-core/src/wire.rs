//! Framing: fixed-offset binary layouts for routing packets (4-byte header + 20-byte RTEs)
//! and transfer packets (11 bytes). All multi-byte integers are big-endian.

use std::net::Ipv4Addr;

use crate::id::RoverId;
use crate::protocol::{Command, RouteEntry, RouteUpdate, TransferDescriptor, PROTOCOL_VERSION};

pub const ROUTE_HEADER_LEN: usize = 4;
pub const ROUTE_ENTRY_LEN: usize = 20;
pub const TRANSFER_PACKET_LEN: usize = 11;

const MUST_BE_ZERO: u8 = 0;

/// Encode a routing packet. REQUEST emits the header only; RESPONSE appends one RTE per entry.
pub fn encode_route_update(sender: RoverId, command: Command, entries: &[RouteEntry]) -> Vec<u8> {
    let count = match command {
        Command::Request => 0,
        Command::Response => entries.len(),
    };
    let mut out = Vec::with_capacity(ROUTE_HEADER_LEN + count * ROUTE_ENTRY_LEN);
    out.push(command.as_byte());
    out.push(PROTOCOL_VERSION);
    out.push(sender.as_u8());
    out.push(MUST_BE_ZERO);
    for e in entries.iter().take(count) {
        out.extend_from_slice(&e.address_family.to_be_bytes());
        out.extend_from_slice(&e.route_tag.to_be_bytes());
        out.extend_from_slice(&e.destination.octets());
        out.extend_from_slice(&e.subnet_mask.octets());
        out.extend_from_slice(&e.next_hop.octets());
        out.extend_from_slice(&e.metric.to_be_bytes());
    }
    out
}

/// Decode a routing packet.
///
/// Records are read from offset 4 until the buffer runs out or a zeroed end marker is seen.
/// A partial trailing record is dropped silently.
pub fn decode_route_update(bytes: &[u8]) -> Result<RouteUpdate, WireError> {
    if bytes.len() < ROUTE_HEADER_LEN {
        return Err(WireError::Truncated {
            needed: ROUTE_HEADER_LEN,
            got: bytes.len(),
        });
    }
    let command = Command::from_byte(bytes[0]).ok_or(WireError::UnknownCommand(bytes[0]))?;
    let version = bytes[1];
    if version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let sender = RoverId(bytes[2]);
    let must_be_zero = bytes[3];

    let entries = bytes[ROUTE_HEADER_LEN..]
        .chunks_exact(ROUTE_ENTRY_LEN)
        .map(decode_entry)
        .take_while(|e| !e.is_end_marker())
        .collect();

    Ok(RouteUpdate {
        command,
        version,
        must_be_zero,
        sender,
        entries,
    })
}

fn decode_entry(rec: &[u8]) -> RouteEntry {
    let addr = |at: usize| Ipv4Addr::new(rec[at], rec[at + 1], rec[at + 2], rec[at + 3]);
    RouteEntry {
        address_family: u16::from_be_bytes([rec[0], rec[1]]),
        route_tag: u16::from_be_bytes([rec[2], rec[3]]),
        destination: addr(4),
        subnet_mask: addr(8),
        next_hop: addr(12),
        metric: u32::from_be_bytes([rec[16], rec[17], rec[18], rec[19]]),
    }
}

/// Encode a transfer packet.
///
/// Layout: eos, payload, ack-echo, source address (bytes 3..7), destination address (bytes 7..11).
/// Only the third octet of each address is significant; the final byte carries the sequence bit.
pub fn encode_transfer(d: &TransferDescriptor) -> [u8; TRANSFER_PACKET_LEN] {
    let mut out = [0u8; TRANSFER_PACKET_LEN];
    out[0] = u8::from(d.end_of_stream);
    out[1] = d.payload;
    out[2] = d.ack_echo;
    out[3..7].copy_from_slice(&d.source.to_ipv4().octets());
    out[7..11].copy_from_slice(&d.destination.to_ipv4().octets());
    out[10] = u8::from(d.sequence);
    out
}

/// Decode a transfer packet, rebuilding peer ids from bytes 5 and 9.
pub fn decode_transfer(bytes: &[u8]) -> Result<TransferDescriptor, WireError> {
    if bytes.len() < TRANSFER_PACKET_LEN {
        return Err(WireError::Truncated {
            needed: TRANSFER_PACKET_LEN,
            got: bytes.len(),
        });
    }
    Ok(TransferDescriptor {
        end_of_stream: bytes[0] != 0,
        payload: bytes[1],
        ack_echo: bytes[2],
        sequence: bytes[10] & 1 == 1,
        source: RoverId(bytes[5]),
        destination: RoverId(bytes[9]),
    })
}

/// Error decoding a packet (too short, or a header this node does not speak).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("packet truncated: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("unknown routing command {0}")]
    UnknownCommand(u8),
    #[error("unsupported routing version {0}")]
    UnsupportedVersion(u8),
}
