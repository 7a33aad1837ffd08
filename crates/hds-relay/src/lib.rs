//! HDS Relay
//!
//! Receives heart-rate telemetry from the Health Data Server app (or from
//! another relay's stream) and fans every update out to the enabled
//! exporters:
//!
//! - [`exporters::broadcast`]: latest record over HTTP plus a live WebSocket stream
//! - [`exporters::signal`]: normalized heart rate over OSC
//! - [`exporters::metrics`]: Prometheus gauges while data is fresh
//!
//! [`relay::run`] wires everything from a [`RelayConfig`](hds_relay_core::RelayConfig).

pub mod cli;
pub mod exporters;
pub mod http;
pub mod receivers;
pub mod relay;
pub mod version;

pub use relay::{run, Relay};
