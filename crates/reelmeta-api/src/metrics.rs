//! Request metrics, injected into the executor as a sink.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::ErrorKind;

/// Upper bound of the default latency histogram, in milliseconds.
const LATENCY_MAX_MS: u64 = 1_000;

/// Width of one default latency bucket, in milliseconds.
const LATENCY_STEP_MS: u64 = 50;

/// Labels attached to every measurement of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLabels<'a> {
    /// HTTP verb.
    pub method: &'a str,
    /// Request path relative to the base URL.
    pub path: &'a str,
}

/// Receives one set of measurements per logical request (retries are not metered).
#[allow(clippy::module_name_repetitions)]
pub trait MetricsSink: Send + Sync + fmt::Debug {
    /// Counts a request.
    fn record_request(&self, labels: &RequestLabels<'_>);

    /// Counts a failed request.
    fn record_error(&self, labels: &RequestLabels<'_>, kind: ErrorKind);

    /// Records the end-to-end duration, first attempt to final outcome.
    fn record_duration(&self, labels: &RequestLabels<'_>, elapsed: Duration);
}

/// Discards all measurements.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_request(&self, _labels: &RequestLabels<'_>) {}

    fn record_error(&self, _labels: &RequestLabels<'_>, _kind: ErrorKind) {}

    fn record_duration(&self, _labels: &RequestLabels<'_>, _elapsed: Duration) {}
}

/// Bucket boundaries (ms) of the default latency histogram: 0, 50, ..., 1000.
#[must_use]
pub fn default_latency_boundaries_ms() -> Vec<u64> {
    LatencyHistogram::default().boundaries_ms().to_vec()
}

/// Cumulative-style histogram with fixed millisecond boundaries.
///
/// Bucket `i` counts observations `<= boundaries[i]`; the final bucket counts
/// everything above the last boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyHistogram {
    boundaries_ms: Vec<u64>,
    counts: Vec<u64>,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::linear(0, LATENCY_MAX_MS, LATENCY_STEP_MS)
    }
}

impl LatencyHistogram {
    /// Linear boundaries from `start` to `end` (inclusive) in `step` increments.
    #[must_use]
    pub fn linear(start: u64, end: u64, step: u64) -> Self {
        let step = usize::try_from(step.max(1)).unwrap_or(usize::MAX);
        let boundaries_ms: Vec<u64> = (start..=end).step_by(step).collect();
        let counts = vec![0; boundaries_ms.len().saturating_add(1)];
        Self {
            boundaries_ms,
            counts,
        }
    }

    /// Adds one observation.
    pub fn observe(&mut self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let index = self.boundaries_ms.partition_point(|b| *b < ms);
        if let Some(count) = self.counts.get_mut(index) {
            *count = count.saturating_add(1);
        }
    }

    /// Bucket boundaries in milliseconds.
    #[must_use]
    pub fn boundaries_ms(&self) -> &[u64] {
        &self.boundaries_ms
    }

    /// Per-bucket counts; one longer than the boundaries (overflow bucket last).
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total number of observations.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Point-in-time copy of a [`RecordingMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests started.
    pub requests: u64,
    /// Failures by kind.
    pub errors: BTreeMap<ErrorKind, u64>,
    /// Sum of recorded durations.
    pub total_duration: Duration,
    /// Longest recorded duration.
    pub max_duration: Duration,
    /// Durations bucketed into the default histogram.
    pub latency: LatencyHistogram,
}

impl MetricsSnapshot {
    /// Total failures across all kinds.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.errors.values().sum()
    }
}

/// Keeps measurements in memory in constant space: counters, duration sum and
/// maximum, and the bucketed [`LatencyHistogram`].
#[derive(Debug, Default)]
#[allow(clippy::module_name_repetitions)]
pub struct RecordingMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl RecordingMetrics {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current measurements.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut MetricsSnapshot)) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_request(&self, _labels: &RequestLabels<'_>) {
        self.update(|s| s.requests = s.requests.saturating_add(1));
    }

    fn record_error(&self, _labels: &RequestLabels<'_>, kind: ErrorKind) {
        self.update(|s| {
            let count = s.errors.entry(kind).or_insert(0);
            *count = count.saturating_add(1);
        });
    }

    fn record_duration(&self, _labels: &RequestLabels<'_>, elapsed: Duration) {
        self.update(|s| {
            s.total_duration = s.total_duration.saturating_add(elapsed);
            s.max_duration = s.max_duration.max(elapsed);
            s.latency.observe(elapsed);
        });
    }
}

/// OpenTelemetry-backed sink.
#[cfg(feature = "otel")]
mod otel {
    use std::time::Duration;

    use opentelemetry::KeyValue;
    use opentelemetry::metrics::{Counter, Histogram, Meter};

    use super::{MetricsSink, RequestLabels, default_latency_boundaries_ms};
    use crate::error::ErrorKind;

    /// Instrument scope name.
    const METER_NAME: &str = "reelmeta_api";

    /// Exports request counters and a latency histogram through an OpenTelemetry meter.
    #[derive(Debug, Clone)]
    pub struct OtelMetrics {
        /// Requests started.
        requests: Counter<u64>,
        /// Failed requests.
        errors: Counter<u64>,
        /// End-to-end duration in milliseconds.
        duration: Histogram<f64>,
    }

    impl OtelMetrics {
        /// Creates the instruments on `meter`.
        #[must_use]
        pub fn new(meter: &Meter) -> Self {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            let boundaries: Vec<f64> = default_latency_boundaries_ms()
                .into_iter()
                .map(|b| b as f64)
                .collect();
            Self {
                requests: meter
                    .u64_counter("reelmeta.api.requests")
                    .with_description("Metadata API requests")
                    .build(),
                errors: meter
                    .u64_counter("reelmeta.api.errors")
                    .with_description("Failed metadata API requests")
                    .build(),
                duration: meter
                    .f64_histogram("reelmeta.api.duration")
                    .with_unit("ms")
                    .with_description("Metadata API request duration")
                    .with_boundaries(boundaries)
                    .build(),
            }
        }

        /// Creates the instruments on the global meter provider.
        #[must_use]
        pub fn global() -> Self {
            Self::new(&opentelemetry::global::meter(METER_NAME))
        }
    }

    fn attributes(labels: &RequestLabels<'_>) -> [KeyValue; 2] {
        [
            KeyValue::new("http.method", String::from(labels.method)),
            KeyValue::new("url.path", String::from(labels.path)),
        ]
    }

    impl MetricsSink for OtelMetrics {
        fn record_request(&self, labels: &RequestLabels<'_>) {
            self.requests.add(1, &attributes(labels));
        }

        fn record_error(&self, labels: &RequestLabels<'_>, kind: ErrorKind) {
            let [method, path] = attributes(labels);
            self.errors
                .add(1, &[method, path, KeyValue::new("error.kind", kind.as_str())]);
        }

        fn record_duration(&self, labels: &RequestLabels<'_>, elapsed: Duration) {
            self.duration
                .record(elapsed.as_secs_f64() * 1_000.0, &attributes(labels));
        }
    }
}

#[cfg(feature = "otel")]
pub use otel::OtelMetrics;
