//! HDS Relay core
//!
//! Shared building blocks for the heart-rate telemetry relay:
//!
//! - [`record`]: the in-memory health record and the `{data, updatedKey}` frame
//! - [`exporter`]: the exporter capability and its ordered fan-out
//! - [`backoff`]: reconnect policy for the pull transport
//! - [`config`]: the immutable process configuration
//! - [`error`]: error types
//!
//! The record is owned by whichever ingestion transport is running. Exporters
//! only see it through [`Exporter::update`] calls and keep their own copies.

pub mod backoff;
pub mod config;
pub mod error;
pub mod exporter;
pub mod record;

pub use backoff::Backoff;
pub use config::{
    BroadcastConfig, IngestConfig, IngestMode, MetricsConfig, PushProtocol, RelayConfig,
    SignalConfig,
};
pub use error::{ExportError, RelayError, Result};
pub use exporter::{Exporter, ExporterSet};
pub use record::{key_touches, HealthRecord, MetricKey, UpdateMessage, ALL_FIELDS};
