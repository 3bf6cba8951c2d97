//! Depth Sampler
//!
//! Publishes the queue occupancy into a gauge on a fixed period. The value is
//! a point-in-time snapshot; it can be stale by the time it is scraped.

use std::sync::Arc;
use std::time::Duration;

use prometheus::Gauge;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace};

use crate::queue::BoundedQueue;

/// Periodically copies queue occupancy into a gauge.
pub struct DepthSampler {
    queue: Arc<BoundedQueue>,
    gauge: Gauge,
    period: Duration,
}

impl DepthSampler {
    pub fn new(queue: Arc<BoundedQueue>, gauge: Gauge, period: Duration) -> Self {
        Self {
            queue,
            gauge,
            period,
        }
    }

    /// Read occupancy once and overwrite the gauge with it.
    pub fn sample(&self) -> usize {
        let depth = self.queue.occupancy();
        self.gauge.set(depth as f64);
        depth
    }

    /// Sample every `period` until cancelled. The first sample is taken
    /// immediately.
    #[instrument(name = "depth_sampler", skip_all, fields(period = ?self.period))]
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting depth sampler");

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let depth = self.sample();
                    trace!(depth, "Sampled queue depth");
                }
            }
        }

        info!("Depth sampler stopped");
    }
}
