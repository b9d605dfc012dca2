//! File transfer over UDP: data and ack listeners, relaying, and the stop-and-wait send loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use rover_core::transfer::forward;
use rover_core::{
    decode_transfer, AckOutcome, Channel, Delivery, Receiver, RoverId, Sender, TransferDescriptor,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::node::{Node, TransferWaiters};

const MAX_PACKET: usize = 64;

/// Bind the data and ack ports on all interfaces.
pub async fn bind_sockets(node: &Node) -> std::io::Result<(UdpSocket, UdpSocket)> {
    let data = UdpSocket::bind(("0.0.0.0", node.config.protocol.data_port)).await?;
    let ack = UdpSocket::bind(("0.0.0.0", node.config.protocol.ack_port)).await?;
    Ok((data, ack))
}

/// Route `pkt` toward its destination and send it once. Routing and send failures are logged;
/// the sender's retransmission recovers them.
async fn relay(node: &Node, socket: &UdpSocket, pkt: &TransferDescriptor, channel: Channel) {
    let routed = forward(&*node.router.lock().await, pkt, channel);
    match routed {
        Ok((target, bytes)) => {
            if let Err(e) = socket.send_to(&bytes, target).await {
                warn!(rover = %node.id, %target, error = %e, "transfer send failed");
            }
        }
        Err(e) => warn!(rover = %node.id, ?channel, error = %e, "transfer packet dropped"),
    }
}

/// Decode one received datagram. Receive and decode failures are logged and yield `None`;
/// the listener goes on with the next datagram.
fn accept(
    node: &Node,
    channel: Channel,
    received: std::io::Result<(usize, SocketAddr)>,
    buf: &[u8],
) -> Option<TransferDescriptor> {
    let (n, from) = match received {
        Ok(r) => r,
        Err(e) => {
            warn!(rover = %node.id, ?channel, error = %e, "transfer receive failed");
            return None;
        }
    };
    match decode_transfer(&buf[..n]) {
        Ok(pkt) => Some(pkt),
        Err(e) => {
            debug!(rover = %node.id, ?channel, %from, error = %e, "dropping transfer packet");
            None
        }
    }
}

/// Handle data packets: deliver the ones addressed to us, relay the rest.
pub async fn run_data_listener(
    node: Arc<Node>,
    data: Arc<UdpSocket>,
    ack: Arc<UdpSocket>,
) -> std::io::Result<()> {
    let mut receiver = Receiver::new(node.id);
    let mut buf = [0u8; MAX_PACKET];
    loop {
        let received = data.recv_from(&mut buf).await;
        let Some(pkt) = accept(&node, Channel::Data, received, &buf) else {
            continue;
        };
        match receiver.on_data(pkt) {
            Delivery::Forward(p) => {
                debug!(rover = %node.id, source = %p.source, destination = %p.destination, "relaying data");
                relay(&node, &data, &p, Channel::Data).await;
            }
            Delivery::Ack(a) => relay(&node, &ack, &a, Channel::Ack).await,
            Delivery::Duplicate(a) => {
                debug!(rover = %node.id, source = %pkt.source, "duplicate data, re-acking");
                relay(&node, &ack, &a, Channel::Ack).await;
            }
            Delivery::Complete { ack: a, source, bytes } => {
                relay(&node, &ack, &a, Channel::Ack).await;
                store(source, &bytes).await;
            }
        }
    }
}

async fn store(source: RoverId, bytes: &[u8]) {
    let path = PathBuf::from(format!("received-from-{}.bin", source.as_u8()));
    info!(%source, len = bytes.len(), "transfer received");
    if let Err(e) = tokio::fs::write(&path, bytes).await {
        warn!(path = %path.display(), error = %e, "cannot write received file");
    }
}

/// Handle acks: hand ours to the waiting sender, relay the rest.
pub async fn run_ack_listener(node: Arc<Node>, ack: Arc<UdpSocket>) -> std::io::Result<()> {
    let mut buf = [0u8; MAX_PACKET];
    loop {
        let received = ack.recv_from(&mut buf).await;
        let Some(a) = accept(&node, Channel::Ack, received, &buf) else {
            continue;
        };
        if a.destination != node.id {
            relay(&node, &ack, &a, Channel::Ack).await;
        } else if !deliver_ack(&node.waiters, a).await {
            debug!(rover = %node.id, source = %a.source, "ack with no transfer waiting");
        }
    }
}

/// Pass `ack` to the transfer sending to its source. Returns false if none is waiting.
pub async fn deliver_ack(waiters: &TransferWaiters, ack: TransferDescriptor) -> bool {
    match waiters.lock().await.get(&ack.source) {
        Some(tx) => tx.send(ack).is_ok(),
        None => false,
    }
}

/// Send `bytes` to `destination`, one byte in flight, resending on every retransmission tick.
/// Returns the number of bytes acknowledged.
pub async fn send_file(
    node: Arc<Node>,
    data: Arc<UdpSocket>,
    destination: RoverId,
    bytes: Vec<u8>,
) -> std::io::Result<usize> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    node.waiters.lock().await.insert(destination, tx);
    info!(rover = %node.id, %destination, len = bytes.len(), "transfer started");

    let retransmit = node.config.protocol.retransmit_interval();
    let mut sender = Sender::new(node.id, destination, bytes);
    let mut deadline = Instant::now() + retransmit;
    let result = loop {
        if sender.is_complete() {
            break Ok(sender.delivered());
        }
        if let Some(pkt) = sender.poll_transmit() {
            relay(&node, &data, &pkt, Channel::Data).await;
            deadline = Instant::now() + retransmit;
        }
        tokio::select! {
            a = rx.recv() => match a {
                Some(a) => {
                    if sender.on_ack(&a) == AckOutcome::Stale {
                        debug!(rover = %node.id, %destination, "stale ack ignored");
                    }
                }
                None => break Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "transfer superseded",
                )),
            },
            _ = tokio::time::sleep_until(deadline) => {
                if let Some(pkt) = sender.in_flight().copied() {
                    debug!(rover = %node.id, %destination, "retransmitting");
                    relay(&node, &data, &pkt, Channel::Data).await;
                }
                deadline = Instant::now() + retransmit;
            }
        }
    };

    node.waiters.lock().await.remove(&destination);
    if let Ok(n) = result {
        info!(rover = %node.id, %destination, delivered = n, "transfer complete");
    }
    result
}
