//! Configuration metrics tracking using OpenTelemetry.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for reload operations, labelled by configuration name.
///
/// # Examples
///
/// ```rust,no_run
/// use livecfg::metrics::ConfigMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("livecfg");
/// let metrics = ConfigMetrics::new(meter);
///
/// // Track a reload operation
/// let timer = metrics.start_reload("app");
/// // ... perform reload ...
/// metrics.record_reload_success("app", timer);
/// ```
#[derive(Clone)]
pub struct ConfigMetrics {
    reload_attempts: Counter<u64>,
    reload_success: Counter<u64>,
    reload_failures: Counter<u64>,
    reload_duration: Histogram<f64>,
    config_age_seconds: Gauge<i64>,
    active_subscribers: Gauge<i64>,
    validation_failures: Counter<u64>,
    last_update: Arc<parking_lot::Mutex<HashMap<String, Instant>>>,
}

fn attributes(config: &str) -> [KeyValue; 1] {
    [KeyValue::new("config", config.to_string())]
}

impl ConfigMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let reload_attempts = meter
            .u64_counter("livecfg.reload.attempts")
            .with_description("Total number of reload attempts")
            .build();

        let reload_success = meter
            .u64_counter("livecfg.reload.success")
            .with_description("Number of committed reloads")
            .build();

        let reload_failures = meter
            .u64_counter("livecfg.reload.failures")
            .with_description("Number of rejected reloads")
            .build();

        let reload_duration = meter
            .f64_histogram("livecfg.reload.duration")
            .with_description("Duration of reload operations in seconds")
            .with_unit("s")
            .build();

        let config_age_seconds = meter
            .i64_gauge("livecfg.age")
            .with_description("Time since the last committed configuration in seconds")
            .with_unit("s")
            .build();

        let active_subscribers = meter
            .i64_gauge("livecfg.subscribers.active")
            .with_description("Number of active subscribers")
            .build();

        let validation_failures = meter
            .u64_counter("livecfg.validation.failures")
            .with_description("Number of validation errors reported")
            .build();

        Self {
            reload_attempts,
            reload_success,
            reload_failures,
            reload_duration,
            config_age_seconds,
            active_subscribers,
            validation_failures,
            last_update: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    /// Start a reload operation timer.
    ///
    /// Pass the returned `Instant` to `record_reload_success` or
    /// `record_reload_failure` when the operation completes.
    pub fn start_reload(&self, config: &str) -> Instant {
        self.reload_attempts.add(1, &attributes(config));
        Instant::now()
    }

    /// Record a committed reload.
    pub fn record_reload_success(&self, config: &str, start: Instant) {
        let attrs = attributes(config);
        self.reload_success.add(1, &attrs);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &attrs);
        self.last_update.lock().insert(config.to_string(), Instant::now());
    }

    /// Record a rejected reload.
    pub fn record_reload_failure(&self, config: &str, start: Instant) {
        let attrs = attributes(config);
        self.reload_failures.add(1, &attrs);
        self.reload_duration.record(start.elapsed().as_secs_f64(), &attrs);
    }

    /// Record `count` validation errors from one reload.
    pub fn record_validation_failures(&self, config: &str, count: usize) {
        self.validation_failures.add(count as u64, &attributes(config));
    }

    /// Update the number of active subscribers.
    pub fn update_subscriber_count(&self, config: &str, count: usize) {
        self.active_subscribers.record(count as i64, &attributes(config));
    }

    /// Update the configuration age metric.
    ///
    /// Call periodically to track how stale a configuration is. Names that
    /// never committed are not reported.
    pub fn update_config_age(&self, config: &str) {
        let age = self
            .last_update
            .lock()
            .get(config)
            .map(|at| at.elapsed().as_secs() as i64);
        if let Some(age_secs) = age {
            self.config_age_seconds.record(age_secs, &attributes(config));
        }
    }
}
