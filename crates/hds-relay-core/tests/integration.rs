//! Integration tests for the relay core
//!
//! Covers record update semantics across keys, the fan-out contract with
//! real exporter implementations, and the reconnect schedule.

use hds_relay_core::{
    Backoff, ExportError, Exporter, ExporterSet, HealthRecord, MetricKey, UpdateMessage,
};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Exporter that records every call it receives
#[derive(Default)]
struct RecordingExporter {
    calls: Mutex<Vec<(HealthRecord, String)>>,
}

impl Exporter for RecordingExporter {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn update(&self, record: &HealthRecord, key: &str) -> Result<(), ExportError> {
        self.calls
            .lock()
            .unwrap()
            .push((record.clone(), key.to_string()));
        Ok(())
    }
}

struct FailingExporter;

impl Exporter for FailingExporter {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn update(&self, _record: &HealthRecord, _key: &str) -> Result<(), ExportError> {
        Err(ExportError::Transport("network unreachable".to_string()))
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

fn metric_key() -> impl Strategy<Value = MetricKey> {
    prop::sample::select(MetricKey::ALL.to_vec())
}

proptest! {
    #[test]
    fn apply_writes_named_field_and_leaves_others(
        key in metric_key(),
        value in 0.0f64..100_000.0,
        seed in prop::collection::vec((metric_key(), 0.0f64..1000.0), 0..8),
    ) {
        let mut record = HealthRecord::new();
        for (k, v) in &seed {
            record.apply(k.as_str(), *v);
        }
        let before = record.clone();

        prop_assert_eq!(record.apply(key.as_str(), value), Some(key));

        let expected = match key {
            MetricKey::DistanceTraveled | MetricKey::Speed => value,
            _ => value.trunc(),
        };
        prop_assert_eq!(field_value(&record, key), expected);
        for other in MetricKey::ALL.into_iter().filter(|k| *k != key) {
            prop_assert_eq!(field_value(&record, other), field_value(&before, other));
        }
        prop_assert!(record.time.is_some());
        prop_assert!(record.time >= before.time);
    }

    #[test]
    fn frames_survive_json(heart_rate in 0i64..300, speed in 0.0f64..20.0) {
        let mut record = HealthRecord::new();
        record.apply("heartRate", heart_rate as f64);
        record.apply("speed", speed);

        let json = serde_json::to_string(&UpdateMessage::new(record.clone(), "speed")).unwrap();
        let parsed: UpdateMessage = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(parsed.data.heart_rate, heart_rate);
        prop_assert_eq!(parsed.data.speed, speed);
        prop_assert_eq!(parsed.updated_key, "speed");
    }
}

#[test]
fn test_fan_out_reaches_every_exporter_despite_failure() {
    let before = Arc::new(RecordingExporter::default());
    let after = Arc::new(RecordingExporter::default());
    let set = ExporterSet::new(vec![
        before.clone() as Arc<dyn Exporter>,
        Arc::new(FailingExporter),
        after.clone() as Arc<dyn Exporter>,
    ]);

    let mut record = HealthRecord::new();
    record.apply("heartRate", 80.0);
    assert_eq!(set.dispatch(&record, "heartRate"), 1);

    record.apply("calories", 12.0);
    assert_eq!(set.dispatch(&record, "calories"), 1);

    for exporter in [&before, &after] {
        let calls = exporter.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, "heartRate");
        assert_eq!(calls[1].1, "calories");
        assert_eq!(calls[1].0.heart_rate, 80);
        assert_eq!(calls[1].0.calories, 12);
    }
}

#[test]
fn test_backoff_schedule_matches_reconnect_policy() {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(600));

    let waits: Vec<u64> = (0..12)
        .map(|_| backoff.after_failed_session().as_secs())
        .collect();
    assert_eq!(waits, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 600, 600]);

    assert_eq!(backoff.after_clean_session(), Duration::from_secs(1));
    assert_eq!(backoff.after_failed_session(), Duration::from_secs(1));
}
