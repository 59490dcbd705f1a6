// src/metrics.rs

//! Process-wide metrics sink
//!
//! Aggregates counters and event properties across an invocation. The sink
//! is the only module-level mutable state in the crate and is guarded by a
//! mutex; it is flushed once at exit.

use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Metrics {
    properties: BTreeMap<String, String>,
    metrics: Vec<(String, f64)>,
}

impl Metrics {
    /// Record a string-valued event property; later values win.
    pub fn track_property(&mut self, name: &str, value: impl Into<String>) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Record a numeric measurement.
    pub fn track_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }

    /// Emit everything collected so far through tracing.
    pub fn flush(&self) {
        for (name, value) in &self.properties {
            debug!(target: "metrics", "{} = {}", name, value);
        }
        for (name, value) in &self.metrics {
            debug!(target: "metrics", "{} = {}", name, value);
        }
    }
}

/// The process-wide sink.
pub fn global() -> &'static Mutex<Metrics> {
    static METRICS: OnceLock<Mutex<Metrics>> = OnceLock::new();
    METRICS.get_or_init(|| Mutex::new(Metrics::default()))
}

/// Record a property on the global sink, tolerating a poisoned lock.
pub fn track_property(name: &str, value: impl Into<String>) {
    if let Ok(mut m) = global().lock() {
        m.track_property(name, value);
    }
}

/// Record a metric on the global sink, tolerating a poisoned lock.
pub fn track_metric(name: &str, value: f64) {
    if let Ok(mut m) = global().lock() {
        m.track_metric(name, value);
    }
}
