//! Prometheus exposition of the health record
//!
//! Gauges are computed from the cached record at scrape time. Scrapes return
//! an empty 200 while no update has been received within the freshness
//! window.

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use parking_lot::{Mutex, RwLock};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use hds_relay_core::{ExportError, Exporter, HealthRecord, MetricKey, MetricsConfig};

/// Content type of the text exposition format
pub const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Default)]
struct Cached {
    record: HealthRecord,
    received_at: Option<Instant>,
}

fn metric_name(key: MetricKey) -> (&'static str, &'static str) {
    match key {
        MetricKey::HeartRate => ("heart_rate", "Current heart rate in beats per minute"),
        MetricKey::StepCount => ("step_count", "Cumulative step count"),
        MetricKey::DistanceTraveled => {
            ("distance_traveled_meters", "Cumulative distance traveled in meters")
        }
        MetricKey::Speed => ("speed_meters_per_second", "Current speed in meters per second"),
        MetricKey::Calories => ("calories", "Cumulative calories burned"),
    }
}

fn field_value(record: &HealthRecord, key: MetricKey) -> f64 {
    match key {
        MetricKey::HeartRate => record.heart_rate as f64,
        MetricKey::StepCount => record.step_count as f64,
        MetricKey::DistanceTraveled => record.distance_traveled,
        MetricKey::Speed => record.speed,
        MetricKey::Calories => record.calories as f64,
    }
}

/// Collector reading every gauge from the cached record on collect
struct RecordCollector {
    cached: Arc<RwLock<Cached>>,
    gauges: Vec<(MetricKey, Gauge)>,
    collecting: Mutex<()>,
}

impl RecordCollector {
    fn new(cached: Arc<RwLock<Cached>>) -> prometheus::Result<Self> {
        let gauges = MetricKey::ALL
            .into_iter()
            .map(|key| {
                let (name, help) = metric_name(key);
                Gauge::new(name, help).map(|gauge| (key, gauge))
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        Ok(Self {
            cached,
            gauges,
            collecting: Mutex::new(()),
        })
    }
}

impl Collector for RecordCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges.iter().flat_map(|(_, gauge)| gauge.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        // Concurrent scrapes must not interleave set/collect on the shared gauges
        let _guard = self.collecting.lock();
        let record = self.cached.read().record.clone();
        self.gauges
            .iter()
            .flat_map(|(key, gauge)| {
                gauge.set(field_value(&record, *key));
                gauge.collect()
            })
            .collect()
    }
}

/// Exporter serving `/metrics` while data is fresh
pub struct MetricsEndpoint {
    cached: Arc<RwLock<Cached>>,
    registry: Registry,
    freshness: Duration,
}

impl MetricsEndpoint {
    pub fn new(config: &MetricsConfig) -> prometheus::Result<Self> {
        Self::with_freshness(config.freshness())
    }

    pub fn with_freshness(freshness: Duration) -> prometheus::Result<Self> {
        let cached = Arc::new(RwLock::new(Cached::default()));
        // Private registry: no process or default collectors
        let registry = Registry::new();
        registry.register(Box::new(RecordCollector::new(Arc::clone(&cached))?))?;

        Ok(Self {
            cached,
            registry,
            freshness,
        })
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .with_state(Arc::clone(self))
    }

    /// Whether an update arrived within the freshness window
    pub fn is_fresh(&self) -> bool {
        let cached = self.cached.read();
        cached.record.is_populated()
            && cached
                .received_at
                .is_some_and(|at| at.elapsed() <= self.freshness)
    }

    /// Text exposition, or `None` when there is no current data
    pub fn render(&self) -> prometheus::Result<Option<String>> {
        if !self.is_fresh() {
            return Ok(None);
        }
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map(Some)
            .map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Exporter for MetricsEndpoint {
    fn name(&self) -> &'static str {
        "prometheus"
    }

    fn update(&self, record: &HealthRecord, _key: &str) -> Result<(), ExportError> {
        let mut cached = self.cached.write();
        cached.record = record.clone();
        cached.received_at = Some(Instant::now());
        Ok(())
    }
}

/// GET /metrics
async fn scrape(State(endpoint): State<Arc<MetricsEndpoint>>) -> Response {
    match endpoint.render() {
        Ok(body) => (
            [(CONTENT_TYPE, TEXT_CONTENT_TYPE)],
            body.unwrap_or_default(),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Encoding metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
