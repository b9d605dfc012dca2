//! Load config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Daemon configuration. File: ~/.config/rover/config.toml or /etc/rover/config.toml.
/// Env overrides: ROVER_DATA_PORT, ROVER_ACK_PORT, ROVER_MULTICAST_TTL.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// TTL for routing multicasts (default 1, link-local).
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,
    /// Protocol timing and transfer ports.
    #[serde(default)]
    pub protocol: rover_core::Config,
}

fn default_multicast_ttl() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multicast_ttl: default_multicast_ttl(),
            protocol: rover_core::Config::default(),
        }
    }
}

/// Load config: default, then `explicit` or the first config file found, then env vars.
pub fn load(explicit: Option<&Path>) -> Config {
    let mut c = match explicit {
        Some(p) => load_path(p),
        None => load_file(),
    }
    .unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

pub fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(p) = var("ROVER_DATA_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.protocol.data_port = p;
    }
    if let Some(p) = var("ROVER_ACK_PORT").and_then(|s| s.parse::<u16>().ok()) {
        c.protocol.ack_port = p;
    }
    if let Some(t) = var("ROVER_MULTICAST_TTL").and_then(|s| s.parse::<u32>().ok()) {
        c.multicast_ttl = t;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/rover/config.toml"));
    }
    out.push(PathBuf::from("/etc/rover/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    config_paths()
        .into_iter()
        .find(|p| p.exists())
        .and_then(|p| load_path(&p))
}

fn load_path(p: &Path) -> Option<Config> {
    let s = match std::fs::read_to_string(p) {
        Ok(s) => s,
        Err(e) => {
            warn!(path = %p.display(), error = %e, "cannot read config file, using defaults");
            return None;
        }
    };
    match parse(&s) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(path = %p.display(), error = %e, "invalid config file, using defaults");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_is_all_defaults() {
        let c = parse("").unwrap();
        assert_eq!(c.multicast_ttl, 1);
        assert_eq!(c.protocol, rover_core::Config::default());
    }

    #[test]
    fn protocol_table_overrides() {
        let c = parse(
            r#"
            multicast_ttl = 4

            [protocol]
            announce_interval_secs = 2
            data_port = 7001
            "#,
        )
        .unwrap();
        assert_eq!(c.multicast_ttl, 4);
        assert_eq!(c.protocol.announce_interval_secs, 2);
        assert_eq!(c.protocol.data_port, 7001);
        assert_eq!(c.protocol.ack_port, 6002);
        assert_eq!(c.protocol.peer_timeout_secs, 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse("proxy_port = 3128").is_err());
        assert!(parse("[protocol]\nwindow = 8").is_err());
    }

    #[test]
    fn env_overrides_ports() {
        let env: HashMap<&str, &str> = [
            ("ROVER_DATA_PORT", "9001"),
            ("ROVER_ACK_PORT", "not-a-port"),
            ("ROVER_MULTICAST_TTL", "2"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        apply_env(&mut c, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.protocol.data_port, 9001);
        assert_eq!(c.protocol.ack_port, 6002);
        assert_eq!(c.multicast_ttl, 2);
    }
}
