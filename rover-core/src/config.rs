//! Protocol timing and transfer ports. Every rover in a mesh must agree on these.

use std::time::Duration;

use serde::Deserialize;

/// Protocol configuration. Embedded as the `[protocol]` table of the daemon config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seconds between routing table announcements (default 5).
    #[serde(default = "default_announce_interval")]
    pub announce_interval_secs: u64,
    /// Seconds between liveness sweeps (default 10).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// A neighbor silent for longer than this is unreachable (default 10).
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_secs: u64,
    /// Seconds before an unacknowledged transfer packet is resent (default 5).
    #[serde(default = "default_retransmit_interval")]
    pub retransmit_interval_secs: u64,
    /// UDP port for transfer data packets (default 6001).
    #[serde(default = "default_data_port")]
    pub data_port: u16,
    /// UDP port for transfer acknowledgments (default 6002).
    #[serde(default = "default_ack_port")]
    pub ack_port: u16,
}

fn default_announce_interval() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    10
}
fn default_peer_timeout() -> u64 {
    10
}
fn default_retransmit_interval() -> u64 {
    5
}
fn default_data_port() -> u16 {
    6001
}
fn default_ack_port() -> u16 {
    6002
}

impl Default for Config {
    fn default() -> Self {
        Self {
            announce_interval_secs: default_announce_interval(),
            sweep_interval_secs: default_sweep_interval(),
            peer_timeout_secs: default_peer_timeout(),
            retransmit_interval_secs: default_retransmit_interval(),
            data_port: default_data_port(),
            ack_port: default_ack_port(),
        }
    }
}

impl Config {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_secs(self.retransmit_interval_secs)
    }
}
