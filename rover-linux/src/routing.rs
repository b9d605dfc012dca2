//! Routing over UDP multicast: periodic announcements, update processing, neighbor expiry.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use rover_core::RouteEvent;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::node::Node;

/// Header plus one entry per possible rover.
const MAX_DATAGRAM: usize = 4 + 256 * 20;

pub async fn run_routing(node: Arc<Node>, group: Ipv4Addr, port: u16) -> std::io::Result<()> {
    let socket = Arc::new(make_multicast_socket(group, port, node.config.multicast_ttl)?);
    let dest = SocketAddr::V4(SocketAddrV4::new(group, port));
    info!(rover = %node.id, %group, port, "routing started");

    let announce_task = tokio::spawn(announce_loop(node.clone(), socket.clone(), dest));
    let recv_task = tokio::spawn(recv_loop(node.clone(), socket));
    let sweep_task = tokio::spawn(sweep_loop(node));

    let (a, r, s) = tokio::try_join!(announce_task, recv_task, sweep_task)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    a.and(r).and(s)
}

/// Bind `0.0.0.0:port` with address reuse so several rovers can share a host, and join `group`.
pub fn make_multicast_socket(group: Ipv4Addr, port: u16, ttl: u32) -> std::io::Result<UdpSocket> {
    if !group.is_multicast() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{group} is not a multicast address"),
        ));
    }
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    let bind = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&bind.into())?;
    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_ttl_v4(ttl)?;
    socket.set_multicast_loop_v4(true)?;
    UdpSocket::from_std(socket.into())
}

async fn announce_loop(
    node: Arc<Node>,
    socket: Arc<UdpSocket>,
    dest: SocketAddr,
) -> std::io::Result<()> {
    let interval = node.config.protocol.announce_interval();
    loop {
        let pkt = node.router.lock().await.announcement();
        if let Err(e) = socket.send_to(&pkt, dest).await {
            warn!(rover = %node.id, error = %e, "announcement send failed");
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = node.announce_now.notified() => {
                debug!(rover = %node.id, "announcing early on request");
            }
        }
    }
}

async fn recv_loop(node: Arc<Node>, socket: Arc<UdpSocket>) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(rover = %node.id, error = %e, "routing receive failed");
                continue;
            }
        };
        let mut router = node.router.lock().await;
        match router.on_route_datagram(&buf[..n], from) {
            Ok(RouteEvent::OwnEcho) => {}
            Ok(RouteEvent::Received {
                changed, solicited, ..
            }) => {
                if changed {
                    info!("routing table of {}\n{}", node.id, router.render_table());
                }
                if solicited {
                    node.announce_now.notify_one();
                }
            }
            Err(e) => debug!(rover = %node.id, %from, error = %e, "dropping routing datagram"),
        }
    }
}

/// Expire silent neighbors; when any expired, print the table and announce it right away.
async fn sweep_loop(node: Arc<Node>) -> std::io::Result<()> {
    let interval = node.config.protocol.sweep_interval();
    loop {
        tokio::time::sleep(interval).await;
        let mut router = node.router.lock().await;
        if !router.sweep().is_empty() {
            info!("routing table of {}\n{}", node.id, router.render_table());
            node.announce_now.notify_one();
        }
    }
}
