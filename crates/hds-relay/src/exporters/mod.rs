//! Exporters fed by the ingestion transport
//!
//! Each exporter keeps its own copy of the record. Those that serve data
//! outward expose an axum [`Router`](axum::Router) which the relay binds on
//! its own port.

pub mod broadcast;
pub mod metrics;
pub mod signal;

pub use broadcast::{BroadcastHub, BroadcastServer, PublishStats, Subscription};
pub use metrics::MetricsEndpoint;
pub use signal::{normalize, PacketSink, SignalSender, UdpSink, HEART_RATE_MAX};
