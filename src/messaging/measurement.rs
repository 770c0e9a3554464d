//! # Per-Message Measurement
//!
//! Accumulator for durations, counters, tags and values collected while a
//! single message executes. A fresh instance is created for every message
//! and handed back to the caller when execution completes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Timings in seconds; a key may be recorded more than once per message
    pub durations: HashMap<String, Vec<f64>>,
    pub counters: HashMap<String, i64>,
    pub tags: HashMap<String, String>,
    pub values: HashMap<String, f64>,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_duration(&mut self, key: impl Into<String>, seconds: f64) {
        self.durations.entry(key.into()).or_default().push(seconds);
    }

    pub fn incr(&mut self, key: impl Into<String>, value: i64) {
        *self.counters.entry(key.into()).or_insert(0) += value;
    }

    pub fn decr(&mut self, key: impl Into<String>, value: i64) {
        self.incr(key, -value);
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    /// Start timing `key`; the duration is recorded when the guard is
    /// finished or dropped.
    pub fn track_duration(&mut self, key: impl Into<String>) -> DurationGuard<'_> {
        DurationGuard {
            measurement: self,
            key: Some(key.into()),
            started: Instant::now(),
        }
    }

    pub fn duration_percentile(&self, key: &str, k: f64) -> Option<f64> {
        self.durations
            .get(key)
            .and_then(|values| crate::utils::percentile(values, k))
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn counter(&self, key: &str) -> Option<i64> {
        self.counters.get(key).copied()
    }
}

/// Records elapsed time into a [`Measurement`] on drop
pub struct DurationGuard<'a> {
    measurement: &'a mut Measurement,
    key: Option<String>,
    started: Instant,
}

impl DurationGuard<'_> {
    /// Stop timing and return the recorded seconds
    pub fn finish(mut self) -> f64 {
        self.record()
    }

    fn record(&mut self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if let Some(key) = self.key.take() {
            self.measurement.add_duration(key, elapsed);
        }
        elapsed
    }
}

impl Drop for DurationGuard<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_tags() {
        let mut measurement = Measurement::new();
        measurement.incr("records", 2);
        measurement.incr("records", 3);
        measurement.decr("records", 1);
        measurement.set_tag("exception", "MessageException");
        measurement.set_value("payload_size", 512.0);

        assert_eq!(measurement.counter("records"), Some(4));
        assert_eq!(measurement.tag("exception"), Some("MessageException"));
        assert_eq!(measurement.values["payload_size"], 512.0);
    }

    #[test]
    fn test_track_duration_records_once() {
        let mut measurement = Measurement::new();
        {
            let _guard = measurement.track_duration("work");
        }
        let elapsed = measurement.track_duration("work").finish();

        assert_eq!(measurement.durations["work"].len(), 2);
        assert!(elapsed >= 0.0);
    }

    #[test]
    fn test_duration_percentile() {
        let mut measurement = Measurement::new();
        for value in [0.4, 0.1, 0.3, 0.2] {
            measurement.add_duration("publish.events.created", value);
        }
        assert_eq!(
            measurement.duration_percentile("publish.events.created", 50.0),
            Some(0.2)
        );
        assert_eq!(measurement.duration_percentile("missing", 50.0), None);
    }
}
