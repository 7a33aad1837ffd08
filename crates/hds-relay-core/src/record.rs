//! Health record and update frames
//!
//! The record holds the latest value of every tracked metric together with a
//! single `time` marker for the most recent write to any field. Fields never
//! expire individually.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;

/// Updated-key sentinel used when a frame carries the whole record
pub const ALL_FIELDS: &str = "all";

/// Metrics tracked by the health record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    HeartRate,
    StepCount,
    DistanceTraveled,
    Speed,
    Calories,
}

impl MetricKey {
    /// Every tracked key, in wire order
    pub const ALL: [MetricKey; 5] = [
        MetricKey::HeartRate,
        MetricKey::StepCount,
        MetricKey::DistanceTraveled,
        MetricKey::Speed,
        MetricKey::Calories,
    ];

    /// Wire name as sent by the HDS app
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::HeartRate => "heartRate",
            MetricKey::StepCount => "stepCount",
            MetricKey::DistanceTraveled => "distanceTraveled",
            MetricKey::Speed => "speed",
            MetricKey::Calories => "calories",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| RelayError::UnknownKey(s.to_string()))
    }
}

/// Latest known state of the telemetry stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    /// Most recent write to any field; `None` until the first update
    #[serde(default, with = "wire_time")]
    pub time: Option<DateTime<Utc>>,
    /// Beats per minute
    #[serde(default)]
    pub heart_rate: i64,
    /// Cumulative step count
    #[serde(default)]
    pub step_count: i64,
    /// Cumulative distance in meters
    #[serde(default)]
    pub distance_traveled: f64,
    /// Instantaneous speed in meters per second
    #[serde(default)]
    pub speed: f64,
    /// Cumulative calories
    #[serde(default)]
    pub calories: i64,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `(key, value)` update.
    ///
    /// `time` advances even when the key is unknown; the unknown key is
    /// logged and `None` is returned. Integer fields truncate toward zero.
    pub fn apply(&mut self, key: &str, value: f64) -> Option<MetricKey> {
        self.time = Some(Utc::now());
        match key.parse::<MetricKey>() {
            Ok(metric) => {
                self.set(metric, value);
                Some(metric)
            }
            Err(_) => {
                tracing::warn!(key = %key, "Unknown key");
                None
            }
        }
    }

    /// Write a single field without touching `time`
    pub fn set(&mut self, key: MetricKey, value: f64) {
        match key {
            MetricKey::HeartRate => self.heart_rate = value as i64,
            MetricKey::StepCount => self.step_count = value as i64,
            MetricKey::DistanceTraveled => self.distance_traveled = value,
            MetricKey::Speed => self.speed = value,
            MetricKey::Calories => self.calories = value as i64,
        }
    }

    /// Whether any update has ever been applied
    pub fn is_populated(&self) -> bool {
        self.time.is_some()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.time
    }
}

/// Frame shared by the pull transport and the broadcast stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessage {
    pub data: HealthRecord,
    pub updated_key: String,
}

impl UpdateMessage {
    pub fn new(data: HealthRecord, updated_key: impl Into<String>) -> Self {
        Self {
            data,
            updated_key: updated_key.into(),
        }
    }

    /// Full-record frame, sent to late joiners
    pub fn snapshot(data: HealthRecord) -> Self {
        Self::new(data, ALL_FIELDS)
    }

    pub fn is_snapshot(&self) -> bool {
        self.updated_key == ALL_FIELDS
    }
}

/// Whether an update for `key` carries a new value for `metric`
pub fn key_touches(key: &str, metric: MetricKey) -> bool {
    key == ALL_FIELDS || key == metric.as_str()
}

/// RFC 3339 timestamps where the zero time `0001-01-01T00:00:00Z` means "never"
mod wire_time {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub const ZERO: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S>(time: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(&raw)
            .map_err(D::Error::custom)?
            .with_timezone(&Utc);
        if parsed.year() <= 1 {
            Ok(None)
        } else {
            Ok(Some(parsed))
        }
    }
}
