//! Daemon configuration, consumed from TOML.
//!
//! Sections mirror the config file: `[node]`, `[rpc]`, `[opencl]`,
//! `[pow_server]`. Unknown keys are a hard error so typos surface at
//! startup instead of silently running defaults.

use lattica_types::NetworkKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub opencl: OpenclConfig,
    #[serde(default)]
    pub pow_server: PowServerConfig,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply one `key=value` override, dotted keys addressing sections.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let toml_text = match key.split_once('.') {
            Some((section, rest)) => format!("[{section}]\n{rest} = {value}"),
            None => format!("{key} = {value}"),
        };
        let patch: toml::Value = toml::from_str(&toml_text)?;
        let mut current =
            toml::Value::try_from(&*self).expect("config serializes to toml");
        merge(&mut current, patch);
        *self = current.try_into()?;
        Ok(())
    }
}

fn merge(base: &mut toml::Value, patch: toml::Value) {
    match (base, patch) {
        (toml::Value::Table(base), toml::Value::Table(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// P2P listening port; zero selects the network default.
    #[serde(default)]
    pub peering_port: u16,

    /// Storage backend: "lmdb" or "rocksdb".
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Whether this node signs votes with its configured representatives.
    #[serde(default)]
    pub enable_voting: bool,

    /// Preconfigured peers contacted at startup.
    #[serde(default)]
    pub preconfigured_peers: Vec<String>,

    /// Work generation threads; zero = hardware concurrency.
    #[serde(default)]
    pub work_threads: usize,

    /// Nanoseconds slept between work batches (eco-pow); zero disables.
    #[serde(default)]
    pub pow_sleep_interval_ns: u64,

    /// Outbound bandwidth budget, bytes per second; zero = unlimited.
    #[serde(default = "default_bandwidth_rate")]
    pub bandwidth_limit: usize,

    /// Token-bucket burst size, bytes.
    #[serde(default = "default_bandwidth_burst")]
    pub bandwidth_burst: usize,

    /// Peer connections allowed per source IP.
    #[serde(default = "default_max_peers_per_ip")]
    pub max_peers_per_ip: usize,

    /// Log filter when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty node config is valid")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enable: false,
            port: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OpenclConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub device: u32,
    #[serde(default)]
    pub platform: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PowServerConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub address: String,
}

impl NodeConfig {
    pub fn peering_port_for(&self, kind: NetworkKind) -> u16 {
        if self.peering_port != 0 {
            self.peering_port
        } else {
            lattica_types::NetworkParams::new(kind).default_node_port
        }
    }
}

fn default_backend() -> String {
    "lmdb".to_string()
}

fn default_bandwidth_rate() -> usize {
    10 * 1024 * 1024
}

fn default_bandwidth_burst() -> usize {
    16 * 1024 * 1024
}

fn default_max_peers_per_ip() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_input() {
        let config = DaemonConfig::from_str("").unwrap();
        assert_eq!(config.node.backend, "lmdb");
        assert!(!config.node.enable_voting);
        assert!(!config.rpc.enable);
        assert_eq!(config.node.log_level, "info");
    }

    #[test]
    fn sections_parse() {
        let config = DaemonConfig::from_str(
            r#"
            [node]
            peering_port = 9999
            enable_voting = true
            preconfigured_peers = ["peer.example:7175"]

            [rpc]
            enable = true
            port = 7176

            [opencl]
            enable = false

            [pow_server]
            enable = false
            "#,
        )
        .unwrap();
        assert_eq!(config.node.peering_port, 9999);
        assert!(config.node.enable_voting);
        assert_eq!(config.node.preconfigured_peers.len(), 1);
        assert!(config.rpc.enable);
    }

    #[test]
    fn unknown_keys_error() {
        assert!(DaemonConfig::from_str("[node]\nnot_a_key = 1").is_err());
        assert!(DaemonConfig::from_str("[mystery]\nx = 1").is_err());
    }

    #[test]
    fn overrides_apply() {
        let mut config = DaemonConfig::from_str("").unwrap();
        config.apply_override("node.peering_port", "1234").unwrap();
        config.apply_override("rpc.enable", "true").unwrap();
        assert_eq!(config.node.peering_port, 1234);
        assert!(config.rpc.enable);
        // Bad override keys fail loudly.
        assert!(config.apply_override("node.bogus", "1").is_err());
    }

    #[test]
    fn default_port_follows_network() {
        let config = NodeConfig::default();
        assert_eq!(
            config.peering_port_for(NetworkKind::Test),
            lattica_types::NetworkParams::new(NetworkKind::Test).default_node_port
        );
        let mut custom = NodeConfig::default();
        custom.peering_port = 7777;
        assert_eq!(custom.peering_port_for(NetworkKind::Live), 7777);
    }
}
