// Rover Linux: routing daemon and file transfer endpoint.

mod config;
mod node;
mod routing;
mod transfer;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rover_core::RoverId;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rover-linux", version, about = "Rover mesh routing daemon")]
struct Cli {
    /// Multicast group for routing updates
    group: Ipv4Addr,
    /// This rover's id (0-255), or its address 10.0.X.0
    id: RoverId,
    /// UDP port for routing updates
    port: u16,
    /// Send a file to this rover once routes are known
    #[arg(long, requires = "file")]
    send_to: Option<RoverId>,
    /// File to send
    #[arg(long, requires = "send_to")]
    file: Option<PathBuf>,
    /// Config file (default ~/.config/rover/config.toml, then /etc/rover/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load(cli.config.as_deref());
    let outgoing = match (&cli.send_to, &cli.file) {
        (Some(dest), Some(path)) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            Some((*dest, bytes))
        }
        _ => None,
    };
    let node = node::Node::new(cli.id, cfg);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (data, ack) = transfer::bind_sockets(&node)
            .await
            .context("cannot bind transfer ports")?;
        let (data, ack) = (Arc::new(data), Arc::new(ack));
        info!(rover = %node.id, "rover started");

        let routing_node = node.clone();
        let (group, port) = (cli.group, cli.port);
        tokio::spawn(async move {
            if let Err(e) = routing::run_routing(routing_node, group, port).await {
                error!(error = %e, "routing stopped");
            }
        });
        let data_node = node.clone();
        let (data_rx, ack_tx) = (data.clone(), ack.clone());
        tokio::spawn(async move {
            if let Err(e) = transfer::run_data_listener(data_node, data_rx, ack_tx).await {
                error!(error = %e, "data listener stopped");
            }
        });
        let ack_node = node.clone();
        tokio::spawn(async move {
            if let Err(e) = transfer::run_ack_listener(ack_node, ack).await {
                error!(error = %e, "ack listener stopped");
            }
        });
        if let Some((dest, bytes)) = outgoing {
            let send_node = node.clone();
            tokio::spawn(async move {
                if let Err(e) = transfer::send_file(send_node, data, dest, bytes).await {
                    error!(%dest, error = %e, "transfer failed");
                }
            });
        }

        shutdown_signal().await?;
        info!("shutting down");
        Ok::<(), anyhow::Error>(())
    })
}

/// Wait for Ctrl+C or SIGTERM (Unix). On shutdown, runtime and tasks exit; systemd may restart if configured.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
