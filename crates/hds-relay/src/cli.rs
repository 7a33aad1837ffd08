//! Command line interface

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use hds_relay_core::{
    BroadcastConfig, IngestConfig, IngestMode, MetricsConfig, PushProtocol, RelayConfig,
    SignalConfig,
};

#[derive(Parser, Debug)]
#[command(name = "hds-relay")]
#[command(about = "HDS Relay - heart-rate telemetry to WebSocket, OSC and Prometheus")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay configured from flags and environment
    Serve(ServeArgs),

    /// Run the relay from a config file (TOML, YAML or JSON)
    Run {
        #[arg(short, long, env = "HDS_RELAY_CONFIG")]
        config: PathBuf,
    },

    /// Validate a config file and print the effective configuration
    CheckConfig {
        #[arg(short, long, env = "HDS_RELAY_CONFIG")]
        config: PathBuf,
    },

    /// Print version and build information
    Version,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Push,
    Pull,
}

impl From<ModeArg> for IngestMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Push => IngestMode::Push,
            ModeArg::Pull => IngestMode::Pull,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolArg {
    Multi,
    Legacy,
}

impl From<ProtocolArg> for PushProtocol {
    fn from(protocol: ProtocolArg) -> Self {
        match protocol {
            ProtocolArg::Multi => PushProtocol::Multi,
            ProtocolArg::Legacy => PushProtocol::Legacy,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Ingestion transport
    #[arg(long, value_enum, default_value = "push", env = "HDS_RELAY_MODE")]
    pub mode: ModeArg,

    /// Port the HDS app pushes to
    #[arg(long, default_value = "3476", env = "HDS_RELAY_PUSH_PORT")]
    pub push_port: u16,

    /// Payload grammar accepted in push mode
    #[arg(long, value_enum, default_value = "multi", env = "HDS_RELAY_PUSH_PROTOCOL")]
    pub push_protocol: ProtocolArg,

    /// Remote relay stream to follow in pull mode (ws:// or wss://)
    #[arg(long, env = "HDS_RELAY_PULL_URL")]
    pub pull_url: Option<String>,

    /// First reconnect delay in seconds
    #[arg(long, default_value = "1")]
    pub backoff_initial_secs: u64,

    /// Reconnect delay ceiling in seconds
    #[arg(long, default_value = "600")]
    pub backoff_max_secs: u64,

    /// Serve the latest record and a live WebSocket stream
    #[arg(long, env = "HDS_RELAY_BROADCAST")]
    pub broadcast: bool,

    #[arg(long, default_value = "3030", env = "HDS_RELAY_BROADCAST_PORT")]
    pub broadcast_port: u16,

    /// Forward heart rate over OSC
    #[arg(long, env = "HDS_RELAY_OSC")]
    pub osc: bool,

    #[arg(long, default_value = "127.0.0.1", env = "HDS_RELAY_OSC_HOST")]
    pub osc_host: String,

    #[arg(long, default_value = "9000", env = "HDS_RELAY_OSC_PORT")]
    pub osc_port: u16,

    /// OSC address for the normalized heart rate
    #[arg(long, default_value = "/avatar/parameters/HeartRate", env = "HDS_RELAY_OSC_ADDR")]
    pub osc_addr: String,

    /// OSC address for the debounced activity flag
    #[arg(long, env = "HDS_RELAY_OSC_ENABLED_ADDR")]
    pub osc_enabled_addr: Option<String>,

    /// Silence before the activity flag drops, in milliseconds
    #[arg(long, default_value = "10000")]
    pub osc_debounce_ms: u64,

    /// Expose Prometheus metrics
    #[arg(long, env = "HDS_RELAY_METRICS")]
    pub metrics: bool,

    #[arg(long, default_value = "2112", env = "HDS_RELAY_METRICS_PORT")]
    pub metrics_port: u16,

    /// Seconds after the last update during which metrics are reported
    #[arg(long, default_value = "30")]
    pub metrics_freshness_secs: u64,
}

impl ServeArgs {
    pub fn into_config(self) -> RelayConfig {
        RelayConfig {
            ingest: IngestConfig {
                mode: self.mode.into(),
                push_port: self.push_port,
                push_protocol: self.push_protocol.into(),
                pull_url: self.pull_url,
                backoff_initial_secs: self.backoff_initial_secs,
                backoff_max_secs: self.backoff_max_secs,
            },
            broadcast: BroadcastConfig {
                enabled: self.broadcast,
                port: self.broadcast_port,
            },
            signal: SignalConfig {
                enabled: self.osc,
                host: self.osc_host,
                port: self.osc_port,
                address: self.osc_addr,
                enabled_address: self.osc_enabled_addr,
                debounce_ms: self.osc_debounce_ms,
            },
            metrics: MetricsConfig {
                enabled: self.metrics,
                port: self.metrics_port,
                freshness_secs: self.metrics_freshness_secs,
            },
        }
    }
}
