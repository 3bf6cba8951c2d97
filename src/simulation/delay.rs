//! Delay sources for the producer and consumer pacing.

use std::time::Duration;

use rand::Rng;

/// Supplies the pause taken between two queue operations.
pub trait DelaySource: Send + Sync {
    /// Duration to sleep before the next iteration
    fn next_delay(&self) -> Duration;
}

/// Uniformly random delay in `[0, upper)`, millisecond granularity.
#[derive(Debug, Clone, Copy)]
pub struct UniformDelay {
    upper: Duration,
}

impl UniformDelay {
    pub fn new(upper: Duration) -> Self {
        Self { upper }
    }
}

impl DelaySource for UniformDelay {
    fn next_delay(&self) -> Duration {
        let upper_ms = self.upper.as_millis() as u64;
        if upper_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..upper_ms))
    }
}

/// Always the same delay. Zero makes the workers spin as fast as the queue
/// allows.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl DelaySource for FixedDelay {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_delay_stays_below_upper() {
        let delay = UniformDelay::new(Duration::from_millis(1000));
        for _ in 0..1000 {
            assert!(delay.next_delay() < Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_uniform_delay_zero_upper() {
        let delay = UniformDelay::new(Duration::ZERO);
        assert_eq!(delay.next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay() {
        let delay = FixedDelay(Duration::from_millis(7));
        assert_eq!(delay.next_delay(), Duration::from_millis(7));
        assert_eq!(FixedDelay::default().next_delay(), Duration::ZERO);
    }
}
