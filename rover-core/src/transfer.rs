//! Stop-and-wait byte transfer: sender, receiver and forwarder state machines.
//!
//! At most one byte is in flight per transfer. The sender keeps it until the matching
//! ack arrives; the host resends it on every retransmission tick. The receiver answers a
//! retransmitted byte with the same ack instead of appending it twice. Packets addressed
//! to another rover are relayed once toward their destination; reliability is end to end.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::id::RoverId;
use crate::protocol::TransferDescriptor;
use crate::router::{RouteError, Router};
use crate::wire::{self, TRANSFER_PACKET_LEN};

/// Which transfer port a packet travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Data,
    Ack,
}

/// Result of handing an ack to a [`Sender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// In-flight byte acknowledged; the next one may go out.
    Advanced,
    /// End-of-stream acknowledged; the transfer is done.
    Completed,
    /// Not for the in-flight packet (late duplicate or unrelated); ignored.
    Stale,
}

/// Sending side of one transfer.
pub struct Sender<I> {
    source: RoverId,
    destination: RoverId,
    bytes: I,
    in_flight: Option<TransferDescriptor>,
    sequence: bool,
    delivered: usize,
    complete: bool,
}

impl<I: Iterator<Item = u8>> Sender<I> {
    pub fn new(
        source: RoverId,
        destination: RoverId,
        bytes: impl IntoIterator<Item = u8, IntoIter = I>,
    ) -> Self {
        Self {
            source,
            destination,
            bytes: bytes.into_iter(),
            in_flight: None,
            sequence: false,
            delivered: 0,
            complete: false,
        }
    }

    pub fn destination(&self) -> RoverId {
        self.destination
    }

    /// Next packet to send, or `None` while a byte is unacknowledged or the transfer is done.
    /// Once the source is exhausted the end-of-stream packet is produced.
    pub fn poll_transmit(&mut self) -> Option<TransferDescriptor> {
        if self.complete || self.in_flight.is_some() {
            return None;
        }
        let pkt = match self.bytes.next() {
            Some(b) => TransferDescriptor::data(self.source, self.destination, b, self.sequence),
            None => TransferDescriptor::end_of_stream(self.source, self.destination, self.sequence),
        };
        self.in_flight = Some(pkt);
        Some(pkt)
    }

    /// The unacknowledged packet, to be resent when the retransmission timer fires.
    pub fn in_flight(&self) -> Option<&TransferDescriptor> {
        self.in_flight.as_ref()
    }

    pub fn on_ack(&mut self, ack: &TransferDescriptor) -> AckOutcome {
        match self.in_flight {
            Some(pkt) if pkt.is_acked_by(ack) => {
                self.in_flight = None;
                self.sequence = !self.sequence;
                if pkt.end_of_stream {
                    self.complete = true;
                    AckOutcome::Completed
                } else {
                    self.delivered += 1;
                    AckOutcome::Advanced
                }
            }
            _ => AckOutcome::Stale,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Bytes acknowledged so far (end-of-stream excluded).
    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

/// What the receiver wants done with an incoming data packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Not addressed to us: relay toward its destination on the data channel.
    Forward(TransferDescriptor),
    /// New byte appended; send this ack.
    Ack(TransferDescriptor),
    /// Retransmission of the last acknowledged byte; resend this ack, nothing appended.
    Duplicate(TransferDescriptor),
    /// End of stream: send this ack and hand over the assembled bytes.
    Complete {
        ack: TransferDescriptor,
        source: RoverId,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Default)]
struct InboundStream {
    buffer: Vec<u8>,
    last_ack: Option<TransferDescriptor>,
}

/// Receiving side of every transfer addressed to this rover, one stream per source.
///
/// A completed stream leaves an end-of-stream ack behind, so the next stream from the same
/// source starts clean. A sender that restarts mid-stream cannot be told apart from a
/// retransmission: its first byte is taken as a duplicate when it repeats the last acked
/// byte and parity.
pub struct Receiver {
    id: RoverId,
    streams: HashMap<RoverId, InboundStream>,
}

impl Receiver {
    pub fn new(id: RoverId) -> Self {
        Self {
            id,
            streams: HashMap::new(),
        }
    }

    pub fn on_data(&mut self, pkt: TransferDescriptor) -> Delivery {
        if pkt.destination != self.id {
            return Delivery::Forward(pkt);
        }
        let stream = self.streams.entry(pkt.source).or_default();
        if let Some(last) = stream.last_ack {
            if last.ack_echo == pkt.payload
                && last.sequence == pkt.sequence
                && last.end_of_stream == pkt.end_of_stream
            {
                return Delivery::Duplicate(last);
            }
        }
        let ack = pkt.ack();
        stream.last_ack = Some(ack);
        if pkt.end_of_stream {
            // last_ack survives so a retransmitted end-of-stream is still answered.
            let bytes = std::mem::take(&mut stream.buffer);
            return Delivery::Complete {
                ack,
                source: pkt.source,
                bytes,
            };
        }
        stream.buffer.push(pkt.payload);
        Delivery::Ack(ack)
    }

    /// Bytes received so far from `source` in the current stream.
    pub fn buffered(&self, source: RoverId) -> &[u8] {
        self.streams
            .get(&source)
            .map(|s| s.buffer.as_slice())
            .unwrap_or(&[])
    }
}

/// Relay a packet that is not addressed to this rover: same bytes, next hop toward its destination.
/// Sent once; a failed relay is recovered by the original sender's retransmission.
pub fn forward(
    router: &Router,
    pkt: &TransferDescriptor,
    channel: Channel,
) -> Result<(SocketAddr, [u8; TRANSFER_PACKET_LEN]), RouteError> {
    let target = router.transfer_target(pkt.destination, channel)?;
    Ok((target, wire::encode_transfer(pkt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::router::RouteEvent;

    const A: RoverId = RoverId(1);
    const C: RoverId = RoverId(3);

    /// Drive a sender against a receiver that acks everything, dropping the acks whose index is in `lose`.
    fn run(
        bytes: Vec<u8>,
        lose: &[usize],
    ) -> (Sender<std::vec::IntoIter<u8>>, Receiver, Vec<Vec<u8>>) {
        let mut sender = Sender::new(A, C, bytes);
        let mut receiver = Receiver::new(C);
        let mut completed = Vec::new();
        let mut ack_index = 0;
        let mut steps = 0;
        while !sender.is_complete() {
            steps += 1;
            assert!(steps < 1000, "transfer stalled");
            let pkt = match sender.poll_transmit() {
                Some(p) => p,
                // Retransmission timer fired.
                None => *sender.in_flight().unwrap(),
            };
            let ack = match receiver.on_data(pkt) {
                Delivery::Ack(ack) | Delivery::Duplicate(ack) => ack,
                Delivery::Complete { ack, bytes, .. } => {
                    completed.push(bytes);
                    ack
                }
                Delivery::Forward(_) => panic!("packet addressed to receiver"),
            };
            let lost = lose.contains(&ack_index);
            ack_index += 1;
            if !lost {
                sender.on_ack(&ack);
            }
        }
        (sender, receiver, completed)
    }

    #[test]
    fn delivers_in_order() {
        let (sender, _, completed) = run(vec![0x41, 0x42], &[]);
        assert!(sender.is_complete());
        assert_eq!(sender.delivered(), 2);
        assert_eq!(completed, vec![vec![0x41, 0x42]]);
    }

    #[test]
    fn lost_ack_is_answered_without_double_append() {
        let mut sender = Sender::new(A, C, vec![0x41, 0x42]);
        let mut receiver = Receiver::new(C);

        let first = sender.poll_transmit().unwrap();
        let Delivery::Ack(ack) = receiver.on_data(first) else {
            panic!("expected ack");
        };
        // Ack lost: sender is blocked and resends the identical packet.
        assert_eq!(sender.poll_transmit(), None);
        let resent = *sender.in_flight().unwrap();
        assert_eq!(resent, first);
        assert_eq!(receiver.on_data(resent), Delivery::Duplicate(ack));
        assert_eq!(receiver.buffered(A), &[0x41]);

        assert_eq!(sender.on_ack(&ack), AckOutcome::Advanced);
        assert_eq!(sender.on_ack(&ack), AckOutcome::Stale);
        let second = sender.poll_transmit().unwrap();
        assert_eq!(second.payload, 0x42);
        assert!(matches!(receiver.on_data(second), Delivery::Ack(_)));
        assert_eq!(receiver.buffered(A), &[0x41, 0x42]);
    }

    #[test]
    fn repeated_byte_values_are_not_mistaken_for_duplicates() {
        let (_, _, completed) = run(vec![7, 7, 7, 0], &[1, 4]);
        assert_eq!(completed, vec![vec![7, 7, 7, 0]]);
    }

    #[test]
    fn lost_end_of_stream_ack_completes_once() {
        // Acks: 0x41, 0x42, eos (lost), eos again.
        let (sender, receiver, completed) = run(vec![0x41, 0x42], &[2]);
        assert!(sender.is_complete());
        assert_eq!(completed, vec![vec![0x41, 0x42]]);
        assert!(receiver.buffered(A).is_empty());
    }

    #[test]
    fn empty_stream_sends_only_end_of_stream() {
        let mut sender = Sender::new(A, C, Vec::<u8>::new());
        let pkt = sender.poll_transmit().unwrap();
        assert!(pkt.end_of_stream);
        assert_eq!(sender.on_ack(&pkt.ack()), AckOutcome::Completed);
        assert_eq!(sender.poll_transmit(), None);
    }

    #[test]
    fn unrelated_ack_is_stale() {
        let mut sender = Sender::new(A, C, vec![1]);
        sender.poll_transmit();
        let other = TransferDescriptor::data(RoverId(5), A, 1, false).ack();
        assert_eq!(sender.on_ack(&other), AckOutcome::Stale);
        assert!(sender.in_flight().is_some());
    }

    #[test]
    fn streams_are_kept_per_source() {
        let mut r = Receiver::new(C);
        r.on_data(TransferDescriptor::data(A, C, 1, false));
        r.on_data(TransferDescriptor::data(RoverId(2), C, 9, false));
        r.on_data(TransferDescriptor::data(A, C, 2, true));
        assert_eq!(r.buffered(A), &[1, 2]);
        assert_eq!(r.buffered(RoverId(2)), &[9]);
    }

    #[test]
    fn next_stream_after_completion_starts_clean() {
        let mut r = Receiver::new(C);
        for _ in 0..2 {
            let mut sender = Sender::new(A, C, vec![0x41]);
            let first = sender.poll_transmit().unwrap();
            let Delivery::Ack(ack) = r.on_data(first) else {
                panic!("first byte of a new stream must be appended");
            };
            assert_eq!(sender.on_ack(&ack), AckOutcome::Advanced);
            let eos = sender.poll_transmit().unwrap();
            let Delivery::Complete { ack, bytes, .. } = r.on_data(eos) else {
                panic!("expected completion");
            };
            assert_eq!(bytes, vec![0x41]);
            assert_eq!(sender.on_ack(&ack), AckOutcome::Completed);
        }
    }

    /// In-process mesh: rovers 1-2-3 in a line, sockets replaced by address lookups.
    struct Mesh {
        routers: Vec<Router>,
        receivers: Vec<Receiver>,
    }

    impl Mesh {
        fn addr(i: usize) -> SocketAddr {
            SocketAddr::from(([172, 18, 0, i as u8 + 1], 520))
        }

        fn index_of(addr: SocketAddr) -> usize {
            match addr.ip() {
                std::net::IpAddr::V4(v4) => v4.octets()[3] as usize - 1,
                _ => unreachable!(),
            }
        }

        fn line() -> Self {
            let mut routers: Vec<Router> = (1..=3)
                .map(|i| Router::new(RoverId(i), Config::default()))
                .collect();
            let links = [(0usize, 1usize), (1, 2)];
            for _ in 0..4 {
                let pkts: Vec<Vec<u8>> = routers.iter().map(|r| r.announcement()).collect();
                for &(a, b) in &links {
                    for (from, to) in [(a, b), (b, a)] {
                        let ev = routers[to]
                            .on_route_datagram_at(&pkts[from], Self::addr(from), 0)
                            .unwrap();
                        assert!(matches!(ev, RouteEvent::Received { .. }));
                    }
                }
            }
            let receivers = routers.iter().map(|r| Receiver::new(r.id())).collect();
            Self { routers, receivers }
        }

        /// Carry an ack from rover index `at` to its destination, relaying as needed.
        fn route_ack(&self, mut at: usize, ack: TransferDescriptor) -> usize {
            while self.routers[at].id() != ack.destination {
                let (target, bytes) = forward(&self.routers[at], &ack, Channel::Ack).unwrap();
                assert_eq!(target.port(), Config::default().ack_port);
                assert_eq!(wire::decode_transfer(&bytes).unwrap(), ack);
                at = Self::index_of(target);
            }
            at
        }
    }

    #[test]
    fn three_rover_transfer_through_forwarder() {
        let mut mesh = Mesh::line();
        let mut sender = Sender::new(RoverId(1), RoverId(3), vec![10, 20, 30]);
        let mut received = None;

        while let Some(pkt) = sender.poll_transmit() {
            let mut at = 0;
            let ack = loop {
                match mesh.receivers[at].on_data(pkt) {
                    Delivery::Forward(p) => {
                        let (target, _) = forward(&mesh.routers[at], &p, Channel::Data).unwrap();
                        assert_eq!(target.port(), Config::default().data_port);
                        at = Mesh::index_of(target);
                    }
                    Delivery::Ack(ack) | Delivery::Duplicate(ack) => break ack,
                    Delivery::Complete { ack, source, bytes } => {
                        received = Some((at, source, bytes));
                        break ack;
                    }
                }
            };
            let back = mesh.route_ack(at, ack);
            assert_eq!(back, 0);
            sender.on_ack(&ack);
        }

        assert!(sender.is_complete());
        assert_eq!(received, Some((2, RoverId(1), vec![10, 20, 30])));
        assert!(mesh.receivers[1].buffered(RoverId(1)).is_empty());
    }
}
