//! Prometheus metrics for slotgate limiters
//!
//! Every limiter reports into one process-wide registry, labelled by the
//! limiter's name.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Limiter metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Slots handed out
    pub admitted_total: IntCounterVec,
    /// Callers that gave up waiting, by reason (cancelled, deadline)
    pub cancelled_total: IntCounterVec,
    /// `try_acquire` calls that found no free slot
    pub try_acquire_rejected_total: IntCounterVec,
    /// Slots currently checked out
    pub in_flight: IntGaugeVec,
    /// Time spent waiting for a slot (in seconds)
    pub wait_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let admitted_total = IntCounterVec::new(
            Opts::new(
                "slotgate_admitted_total",
                "Total number of limiter slots acquired",
            ),
            &["limiter"],
        )
        .expect("valid admitted_total metric");

        let cancelled_total = IntCounterVec::new(
            Opts::new(
                "slotgate_cancelled_total",
                "Total number of callers that stopped waiting for a slot",
            ),
            &["limiter", "reason"], // cancelled, deadline
        )
        .expect("valid cancelled_total metric");

        let try_acquire_rejected_total = IntCounterVec::new(
            Opts::new(
                "slotgate_try_acquire_rejected_total",
                "Total number of non-blocking acquires that found no free slot",
            ),
            &["limiter"],
        )
        .expect("valid try_acquire_rejected_total metric");

        let in_flight = IntGaugeVec::new(
            Opts::new("slotgate_in_flight", "Current number of slots checked out"),
            &["limiter"],
        )
        .expect("valid in_flight metric");

        let wait_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "slotgate_wait_duration_seconds",
                "Time spent waiting for a slot in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
                10.0,
            ]),
            &["limiter"],
        )
        .expect("valid wait_duration_seconds metric");

        for collector in [
            Box::new(admitted_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(cancelled_total.clone()),
            Box::new(try_acquire_rejected_total.clone()),
            Box::new(in_flight.clone()),
            Box::new(wait_duration_seconds.clone()),
        ] {
            registry
                .register(collector)
                .expect("metric names are unique");
        }

        Self {
            registry,
            admitted_total,
            cancelled_total,
            try_acquire_rejected_total,
            in_flight,
            wait_duration_seconds,
        }
    }

    /// Record a slot handed out
    pub fn record_admitted(&self, limiter: &str) {
        self.admitted_total.with_label_values(&[limiter]).inc();
        self.in_flight.with_label_values(&[limiter]).inc();
    }

    /// Record a slot handed back
    pub fn record_released(&self, limiter: &str) {
        self.in_flight.with_label_values(&[limiter]).dec();
    }

    /// Record a caller giving up
    pub fn record_cancelled(&self, limiter: &str, reason: &str) {
        self.cancelled_total
            .with_label_values(&[limiter, reason])
            .inc();
    }

    pub fn record_try_acquire_rejected(&self, limiter: &str) {
        self.try_acquire_rejected_total
            .with_label_values(&[limiter])
            .inc();
    }

    pub fn observe_wait(&self, limiter: &str, wait_secs: f64) {
        self.wait_duration_seconds
            .with_label_values(&[limiter])
            .observe(wait_secs);
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
