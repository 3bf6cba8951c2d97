//! Instrument definitions
//!
//! Every instrument shares one namespace, subsystem and set of constant
//! labels taken from [`TelemetryConfig`].

use std::collections::HashMap;

use prometheus::{Gauge, GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};

use super::summary::{Summary, SummaryOpts, DEFAULT_AGE_BUCKETS, DEFAULT_MAX_AGE};
use crate::error::Result;

/// Label dimensions of the request counter
pub const REQUEST_LABELS: &[&str] = &["router", "method", "code"];

/// Label dimension of the queue-length gauge
pub const QUEUE_LABELS: &[&str] = &["name"];

/// Summary quantile objectives and their allowed error
pub const SUMMARY_OBJECTIVES: &[(f64, f64)] = &[(0.5, 0.05), (0.9, 0.01), (0.95, 0.01), (0.99, 0.001)];

// =============================================================================
// Configuration
// =============================================================================

/// Naming applied to every instrument
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Metric namespace (first name component)
    pub namespace: String,

    /// Metric subsystem (second name component)
    pub subsystem: String,

    /// Labels attached to every series
    pub const_labels: HashMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let mut const_labels = HashMap::new();
        const_labels.insert("env".to_string(), "dev".to_string());

        Self {
            namespace: "game".to_string(),
            subsystem: "g1".to_string(),
            const_labels,
        }
    }
}

impl TelemetryConfig {
    fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help)
            .namespace(self.namespace.clone())
            .subsystem(self.subsystem.clone())
            .const_labels(self.const_labels.clone())
    }
}

// =============================================================================
// Instruments
// =============================================================================

/// The full set of simulated instruments.
///
/// All handles are cheap clones over shared, internally synchronized state.
#[derive(Clone)]
pub struct Instruments {
    /// Total requests by `{router, method, code}`
    pub requests: IntCounterVec,

    /// Simulated message queue length by `{name}`
    pub queue_length: GaugeVec,

    /// Request time distribution, default buckets
    pub request_time_histogram: Histogram,

    /// Request time quantiles
    pub request_time_summary: Summary,
}

impl Instruments {
    /// Build all instruments with the given naming
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let requests = IntCounterVec::new(
            config.opts("api_requests_total", "The total number of requests."),
            REQUEST_LABELS,
        )?;

        let queue_length = GaugeVec::new(
            config.opts("message_queue_length", "Length of message queue."),
            QUEUE_LABELS,
        )?;

        let request_time_histogram = Histogram::with_opts(
            HistogramOpts::from(config.opts(
                "request_time_histogram",
                "Histogram of request time consuming.",
            ))
            .buckets(prometheus::DEFAULT_BUCKETS.to_vec()),
        )?;

        let request_time_summary = Summary::with_opts(
            SummaryOpts::new("request_time_summary", "Summary of request time consuming.")
                .namespace(config.namespace.clone())
                .subsystem(config.subsystem.clone())
                .const_labels(config.const_labels.clone())
                .objectives(SUMMARY_OBJECTIVES.to_vec())
                .max_age(DEFAULT_MAX_AGE)
                .age_buckets(DEFAULT_AGE_BUCKETS),
        )?;

        Ok(Self {
            requests,
            queue_length,
            request_time_histogram,
            request_time_summary,
        })
    }

    /// Register every instrument with `registry`
    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.requests.clone()))?;
        registry.register(Box::new(self.queue_length.clone()))?;
        registry.register(Box::new(self.request_time_histogram.clone()))?;
        registry.register(Box::new(self.request_time_summary.clone()))?;
        Ok(())
    }

    /// Gauge series for one simulated queue
    pub fn queue_gauge(&self, queue_name: &str) -> Gauge {
        self.queue_length.with_label_values(&[queue_name])
    }
}
