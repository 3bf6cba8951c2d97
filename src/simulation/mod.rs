//! Queue-depth simulation
//!
//! A producer and a consumer, each randomly paced, share one bounded queue.
//! A sampler copies the queue occupancy into a gauge on a fixed period.
//!
//! ```text
//! Producer ──enqueue──▶ ┌──────────────┐ ◀──dequeue── Consumer
//!                       │ BoundedQueue │
//!                       └──────┬───────┘
//!                              │ occupancy (every 500ms)
//!                              ▼
//!                       DepthSampler ──set──▶ queue-length gauge
//! ```

mod delay;
mod sampler;
mod workers;

use std::sync::Arc;
use std::time::Duration;

use prometheus::Gauge;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Error, Result};
use crate::queue::BoundedQueue;

pub use delay::{DelaySource, FixedDelay, UniformDelay};
pub use sampler::DepthSampler;
pub use workers::{Consumer, Producer};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the queue simulation
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Queue capacity
    pub capacity: usize,

    /// Tokens placed in the queue before the workers start
    pub preload: usize,

    /// Upper bound (exclusive) of the random pause after each operation
    pub max_delay: Duration,

    /// How often occupancy is copied into the gauge
    pub sample_period: Duration,

    /// Value of the gauge's `name` label
    pub queue_name: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            preload: 100,
            max_delay: Duration::from_millis(1000),
            sample_period: Duration::from_millis(500),
            queue_name: "email".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Check the parameters are usable
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("capacity must be at least 1".into()));
        }
        if self.preload > self.capacity {
            return Err(Error::Config(format!(
                "preload {} exceeds capacity {}",
                self.preload, self.capacity
            )));
        }
        if self.sample_period.is_zero() {
            return Err(Error::Config("sample period must be non-zero".into()));
        }
        if self.queue_name.is_empty() {
            return Err(Error::Config("queue name must not be empty".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Queue Simulation
// =============================================================================

/// Owns the simulated queue and the three tasks that act on it.
pub struct QueueSimulation {
    config: SimulationConfig,
    queue: Arc<BoundedQueue>,
    gauge: Gauge,
    delay: Arc<dyn DelaySource>,
}

impl QueueSimulation {
    /// Create a simulation with uniformly random pacing
    pub fn new(config: SimulationConfig, gauge: Gauge) -> Result<Self> {
        let delay = Arc::new(UniformDelay::new(config.max_delay));
        Self::with_delay(config, gauge, delay)
    }

    /// Create a simulation with a caller-supplied delay source
    pub fn with_delay(
        config: SimulationConfig,
        gauge: Gauge,
        delay: Arc<dyn DelaySource>,
    ) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(BoundedQueue::with_preload(config.capacity, config.preload)?);

        Ok(Self {
            config,
            queue,
            gauge,
            delay,
        })
    }

    /// Shared handle to the simulated queue
    pub fn queue(&self) -> Arc<BoundedQueue> {
        self.queue.clone()
    }

    /// Spawn the producer, consumer and sampler on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            queue = %self.config.queue_name,
            capacity = self.config.capacity,
            preload = self.config.preload,
            "Starting queue simulation"
        );

        let producer = Producer::new(self.queue.clone(), self.delay.clone());
        let consumer = Consumer::new(self.queue.clone(), self.delay.clone());
        let sampler = DepthSampler::new(self.queue.clone(), self.gauge, self.config.sample_period);

        vec![
            tokio::spawn(producer.run(cancel.clone())),
            tokio::spawn(consumer.run(cancel.clone())),
            tokio::spawn(sampler.run(cancel)),
        ]
    }
}

impl std::fmt::Debug for QueueSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSimulation")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn gauge() -> Gauge {
        Gauge::new("simulation_queue_length", "Queue length under test").unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.preload, 100);
        assert_eq!(config.max_delay, Duration::from_millis(1000));
        assert_eq!(config.sample_period, Duration::from_millis(500));
        assert_eq!(config.queue_name, "email");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulationConfig {
            preload: 2000,
            ..Default::default()
        };
        assert_matches!(QueueSimulation::new(config, gauge()), Err(Error::Config(_)));

        let config = SimulationConfig {
            sample_period: Duration::ZERO,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_starting_occupancy_is_preload() {
        let simulation = QueueSimulation::new(SimulationConfig::default(), gauge()).unwrap();
        assert_eq!(simulation.queue().occupancy(), 100);
        assert_eq!(simulation.queue().capacity(), 1000);
    }

    #[tokio::test]
    async fn test_gauge_stays_within_bounds_while_running() {
        let config = SimulationConfig {
            capacity: 20,
            preload: 5,
            max_delay: Duration::ZERO,
            sample_period: Duration::from_millis(1),
            ..Default::default()
        };
        let gauge = gauge();
        let simulation =
            QueueSimulation::with_delay(config, gauge.clone(), Arc::new(FixedDelay::default()))
                .unwrap();
        let queue = simulation.queue();
        let cancel = CancellationToken::new();
        let handles = simulation.spawn(cancel.clone());

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(1)).await;
            let value = gauge.get();
            assert!((0.0..=20.0).contains(&value));
            assert!(queue.occupancy() <= 20);
        }

        cancel.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("simulation task should stop on cancel")
                .unwrap();
        }
    }
}
