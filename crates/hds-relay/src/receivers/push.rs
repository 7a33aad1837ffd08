//! HDS push receiver
//!
//! The HDS app writes one metric per request:
//!
//! ```text
//! PUT /
//! {"data": "heartRate:80"}
//! ```
//!
//! Every accepted write updates the record and is dispatched to the
//! exporters before the next write is applied.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use hds_relay_core::{ExporterSet, HealthRecord, MetricKey, PushProtocol};

const LEGACY_PREFIX: &str = "heartRate:";

/// Request body sent by the HDS app
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HdsRequest {
    pub data: String,
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Invalid data format")]
    InvalidFormat,

    #[error("Invalid value format")]
    InvalidValue,
}

impl IntoResponse for PushError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Split an HDS payload into `(key, value)`
pub fn parse_payload(protocol: PushProtocol, data: &str) -> Result<(String, f64), PushError> {
    match protocol {
        PushProtocol::Multi => {
            let mut parts = data.split(':');
            let (key, value) = match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => (key, value),
                _ => return Err(PushError::InvalidFormat),
            };
            let value: f64 = value.trim().parse().map_err(|_| PushError::InvalidValue)?;
            if !value.is_finite() {
                return Err(PushError::InvalidValue);
            }
            Ok((key.to_string(), value))
        }
        PushProtocol::Legacy => {
            let rate = data
                .strip_prefix(LEGACY_PREFIX)
                .ok_or(PushError::InvalidFormat)?
                .parse::<i64>()
                .map_err(|_| PushError::InvalidFormat)?;
            Ok((MetricKey::HeartRate.as_str().to_string(), rate as f64))
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    last_update: Option<DateTime<Utc>>,
}

/// Ingestion transport accepting writes from the HDS app
pub struct PushReceiver {
    record: Mutex<HealthRecord>,
    exporters: ExporterSet,
    protocol: PushProtocol,
}

impl PushReceiver {
    pub fn new(exporters: ExporterSet, protocol: PushProtocol) -> Self {
        Self {
            record: Mutex::new(HealthRecord::new()),
            exporters,
            protocol,
        }
    }

    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", put(receive))
            .route("/health", get(health))
            .with_state(Arc::clone(self))
    }

    pub fn protocol(&self) -> PushProtocol {
        self.protocol
    }

    /// Apply one update and fan it out.
    ///
    /// The lock is held through dispatch so exporters observe writes in
    /// arrival order.
    pub fn ingest(&self, key: &str, value: f64) -> Option<MetricKey> {
        let mut record = self.record.lock();
        let metric = record.apply(key, value);
        self.exporters.dispatch(&record, key);
        metric
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> HealthRecord {
        self.record.lock().clone()
    }
}

/// PUT / - one metric update
async fn receive(
    State(receiver): State<Arc<PushReceiver>>,
    body: Bytes,
) -> Result<StatusCode, PushError> {
    let request: HdsRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(error = %e, "Decoding request");
        PushError::InvalidBody(e.to_string())
    })?;

    tracing::info!(data = %request.data, "Received hds req");
    let (key, value) = parse_payload(receiver.protocol, &request.data).map_err(|e| {
        tracing::error!(data = %request.data, error = %e, "Rejecting hds req");
        e
    })?;

    receiver.ingest(&key, value);
    Ok(StatusCode::OK)
}

/// GET /health
async fn health(State(receiver): State<Arc<PushReceiver>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        last_update: receiver.snapshot().last_updated(),
    })
}
