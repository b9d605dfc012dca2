//! Rover mesh protocol reference implementation.
//! Host-driven: no I/O; host passes received datagrams and timer ticks, receives bytes to send.

pub mod config;
pub mod id;
pub mod liveness;
pub mod peers;
pub mod protocol;
pub mod router;
pub mod table;
pub mod transfer;
pub mod wire;

pub use config::Config;
pub use id::{ParseRoverIdError, RoverId};
pub use protocol::{Command, RouteEntry, RouteUpdate, TransferDescriptor, PROTOCOL_VERSION};
pub use router::{RouteError, RouteEvent, Router};
pub use transfer::{AckOutcome, Channel, Delivery, Receiver, Sender};
pub use wire::{decode_route_update, decode_transfer, encode_route_update, encode_transfer, WireError};
