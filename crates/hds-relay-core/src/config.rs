//! Relay configuration
//!
//! Built once at startup (from CLI flags or a config file) and passed by
//! reference into every component constructor. Nothing mutates it later.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::backoff::Backoff;
use crate::error::{RelayError, Result};

/// Which ingestion transport feeds the relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Accept `PUT /` writes from the HDS app
    #[default]
    Push,
    /// Keep an outbound WebSocket open to another relay
    Pull,
}

/// Payload grammar accepted by the push receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushProtocol {
    /// `<key>:<number>` for any tracked key
    #[default]
    Multi,
    /// `heartRate:<int>` only
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub mode: IngestMode,
    pub push_port: u16,
    pub push_protocol: PushProtocol,
    pub pull_url: Option<String>,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::Push,
            push_port: 3476,
            push_protocol: PushProtocol::Multi,
            pull_url: None,
            backoff_initial_secs: 1,
            backoff_max_secs: 600,
        }
    }
}

impl IngestConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.backoff_initial_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 3030,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// OSC address receiving the normalized heart rate
    pub address: String,
    /// OSC address for the debounced "heart rate active" flag
    pub enabled_address: Option<String>,
    pub debounce_ms: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 9000,
            address: "/avatar/parameters/HeartRate".to_string(),
            enabled_address: None,
            debounce_ms: 10_000,
        }
    }
}

impl SignalConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub freshness_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 2112,
            freshness_secs: 30,
        }
    }
}

impl MetricsConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }
}

/// Complete process configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub ingest: IngestConfig,
    pub broadcast: BroadcastConfig,
    pub signal: SignalConfig,
    pub metrics: MetricsConfig,
}

impl RelayConfig {
    /// Load from a file: YAML for `.yaml`/`.yml`, JSON for `.json`, TOML otherwise
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        Ok(config)
    }

    /// Reject configurations that cannot start
    pub fn validate(&self) -> Result<()> {
        if self.ingest.mode == IngestMode::Pull {
            match self.ingest.pull_url.as_deref() {
                None | Some("") => {
                    return Err(RelayError::config("pull mode requires a pull URL"));
                }
                Some(url) if !(url.starts_with("ws://") || url.starts_with("wss://")) => {
                    return Err(RelayError::config(format!(
                        "pull URL must use ws:// or wss://, got '{}'",
                        url
                    )));
                }
                Some(_) => {}
            }
        }

        if self.ingest.backoff_initial_secs == 0 {
            return Err(RelayError::config("backoff_initial_secs must be at least 1"));
        }
        if self.ingest.backoff_initial_secs > self.ingest.backoff_max_secs {
            return Err(RelayError::config(
                "backoff_initial_secs must not exceed backoff_max_secs",
            ));
        }

        if self.signal.enabled {
            let addresses =
                std::iter::once(&self.signal.address).chain(self.signal.enabled_address.iter());
            for address in addresses {
                if !address.starts_with('/') {
                    return Err(RelayError::config(format!(
                        "OSC address must start with '/', got '{}'",
                        address
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for (name, port) in self.listener_ports() {
            // 0 asks the OS for an ephemeral port
            if port != 0 && !seen.insert(port) {
                return Err(RelayError::config(format!(
                    "port {} for {} is already used by another listener",
                    port, name
                )));
            }
        }

        Ok(())
    }

    /// Ports this configuration will listen on, by component
    pub fn listener_ports(&self) -> Vec<(&'static str, u16)> {
        let mut ports = Vec::new();
        if self.ingest.mode == IngestMode::Push {
            ports.push(("push receiver", self.ingest.push_port));
        }
        if self.broadcast.enabled {
            ports.push(("broadcast server", self.broadcast.port));
        }
        if self.metrics.enabled {
            ports.push(("metrics endpoint", self.metrics.port));
        }
        ports
    }
}
