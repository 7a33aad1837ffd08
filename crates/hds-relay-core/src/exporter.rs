//! Exporter capability and ordered fan-out
//!
//! An exporter receives "metric X changed, here is the whole record" and
//! forwards it somewhere. Exporters are registered once at startup; the set
//! is never mutated afterwards.

use std::sync::Arc;

use crate::error::ExportError;
use crate::record::HealthRecord;

/// Sink that forwards record updates to an external system
///
/// `update` runs on the ingestion context and must not block: slow work
/// belongs on the exporter's own tasks.
#[cfg_attr(test, mockall::automock)]
pub trait Exporter: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Forward `record` after `key` changed (`"all"` for a full snapshot)
    fn update(&self, record: &HealthRecord, key: &str) -> Result<(), ExportError>;
}

/// Ordered set of exporters notified on every update
#[derive(Clone, Default)]
pub struct ExporterSet {
    exporters: Vec<Arc<dyn Exporter>>,
}

impl ExporterSet {
    pub fn new(exporters: Vec<Arc<dyn Exporter>>) -> Self {
        Self { exporters }
    }

    /// Notify every exporter in registration order.
    ///
    /// Failures are logged and counted; they never stop later exporters.
    pub fn dispatch(&self, record: &HealthRecord, key: &str) -> usize {
        let mut failures = 0;
        for exporter in &self.exporters {
            if let Err(e) = exporter.update(record, key) {
                failures += 1;
                tracing::error!(
                    exporter = exporter.name(),
                    updated_key = %key,
                    error = %e,
                    "Sending data"
                );
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }

    /// Exporter names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.exporters.iter().map(|e| e.name()).collect()
    }
}

impl std::fmt::Debug for ExporterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterSet")
            .field("exporters", &self.names())
            .finish()
    }
}
