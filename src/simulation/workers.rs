//! Producer and Consumer processes
//!
//! Each worker performs one queue operation, then pauses for a duration
//! drawn from its [`DelaySource`]. The queue wait and the pause run one after
//! the other, never concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace};

use super::delay::DelaySource;
use crate::queue::{BoundedQueue, Token};

/// Pause between iterations. A zero delay still yields so the opposite
/// worker and the sampler get scheduled.
async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

// =============================================================================
// Producer
// =============================================================================

/// Repeatedly adds one token to the queue.
pub struct Producer {
    queue: Arc<BoundedQueue>,
    delay: Arc<dyn DelaySource>,
}

impl Producer {
    pub fn new(queue: Arc<BoundedQueue>, delay: Arc<dyn DelaySource>) -> Self {
        Self { queue, delay }
    }

    /// Enqueue one token (waiting while the queue is full), then pause.
    pub async fn step(&self) {
        self.queue.enqueue(Token).await;
        trace!(occupancy = self.queue.occupancy(), "Produced token");
        pause(self.delay.next_delay()).await;
    }

    /// Run until cancelled
    #[instrument(name = "producer", skip_all)]
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting producer");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.step() => {}
            }
        }
        info!("Producer stopped");
    }
}

// =============================================================================
// Consumer
// =============================================================================

/// Repeatedly removes one token from the queue.
pub struct Consumer {
    queue: Arc<BoundedQueue>,
    delay: Arc<dyn DelaySource>,
}

impl Consumer {
    pub fn new(queue: Arc<BoundedQueue>, delay: Arc<dyn DelaySource>) -> Self {
        Self { queue, delay }
    }

    /// Dequeue one token (waiting while the queue is empty), then pause.
    pub async fn step(&self) {
        let _token = self.queue.dequeue().await;
        trace!(occupancy = self.queue.occupancy(), "Consumed token");
        pause(self.delay.next_delay()).await;
    }

    /// Run until cancelled
    #[instrument(name = "consumer", skip_all)]
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting consumer");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.step() => {}
            }
        }
        info!("Consumer stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
