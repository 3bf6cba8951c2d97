//! Emit loops
//!
//! Stateless periodic tasks feeding the request counter, histogram and
//! summary. They share nothing with the queue simulation except the
//! registry the instruments live in.

use std::time::Duration;

use prometheus::{Histogram, IntCounterVec};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::instruments::Instruments;
use super::summary::Summary;

/// Configuration for the emit loops
#[derive(Debug, Clone)]
pub struct EmitConfig {
    /// Tick period shared by all loops
    pub period: Duration,

    /// Probability that a `/user/add` request is recorded as failed
    pub error_ratio: f64,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            error_ratio: 0.3,
        }
    }
}

/// Anything a periodic loop can feed one value per tick.
pub trait Observe: Send + Sync + 'static {
    fn observe(&self, value: f64);
}

impl Observe for Histogram {
    fn observe(&self, value: f64) {
        Histogram::observe(self, value);
    }
}

impl Observe for Summary {
    fn observe(&self, value: f64) {
        Summary::observe(self, value);
    }
}

/// Drive `tick` every `period` until cancelled.
async fn run_periodic<F: FnMut()>(period: Duration, cancel: CancellationToken, mut tick: F) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => tick(),
        }
    }
}

// =============================================================================
// Request Counter Loop
// =============================================================================

/// Simulates request traffic on two routes.
///
/// `/user/list GET 200` succeeds on every tick. `/user/add POST` is counted
/// as `500` with probability `error_ratio`, `200` otherwise.
pub struct RequestCounterLoop {
    counter: IntCounterVec,
    error_ratio: f64,
}

impl RequestCounterLoop {
    pub fn new(counter: IntCounterVec, error_ratio: f64) -> Self {
        Self {
            counter,
            error_ratio: if error_ratio.is_nan() {
                0.0
            } else {
                error_ratio.clamp(0.0, 1.0)
            },
        }
    }

    /// One tick with a random error decision
    pub fn tick(&self) {
        let failed = rand::thread_rng().gen_bool(self.error_ratio);
        self.record(failed);
    }

    /// One tick with the error decision made by the caller
    pub fn record(&self, failed: bool) {
        self.counter
            .with_label_values(&["/user/list", "GET", "200"])
            .inc();

        let code = if failed { "500" } else { "200" };
        self.counter
            .with_label_values(&["/user/add", "POST", code])
            .inc();
    }

    #[instrument(name = "request_counter", skip_all)]
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        info!("Starting request counter loop");
        run_periodic(period, cancel, || self.tick()).await;
        info!("Request counter loop stopped");
    }
}

// =============================================================================
// Observe Loop
// =============================================================================

/// Feeds one uniform `[0, 1)` value per tick into a histogram or summary.
pub struct ObserveLoop<T: Observe> {
    name: &'static str,
    target: T,
}

impl<T: Observe> ObserveLoop<T> {
    pub fn new(name: &'static str, target: T) -> Self {
        Self { name, target }
    }

    /// Observe one random value and return it
    pub fn tick(&self) -> f64 {
        let value: f64 = rand::thread_rng().gen();
        self.target.observe(value);
        value
    }

    #[instrument(name = "observe_loop", skip_all, fields(target = self.name))]
    pub async fn run(self, period: Duration, cancel: CancellationToken) {
        info!("Starting observe loop");
        run_periodic(period, cancel, || {
            self.tick();
        })
        .await;
        info!("Observe loop stopped");
    }
}

/// Spawn the counter, histogram and summary loops.
pub fn spawn_emitters(
    instruments: &Instruments,
    config: &EmitConfig,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let counter = RequestCounterLoop::new(instruments.requests.clone(), config.error_ratio);
    let histogram = ObserveLoop::new(
        "request_time_histogram",
        instruments.request_time_histogram.clone(),
    );
    let summary = ObserveLoop::new(
        "request_time_summary",
        instruments.request_time_summary.clone(),
    );

    vec![
        tokio::spawn(counter.run(config.period, cancel.clone())),
        tokio::spawn(histogram.run(config.period, cancel.clone())),
        tokio::spawn(summary.run(config.period, cancel)),
    ]
}
