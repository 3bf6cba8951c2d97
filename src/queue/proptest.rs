//! Property-Based Tests for the Bounded Queue
//!
//! Drives the queue with arbitrary enqueue/dequeue sequences, polling each
//! operation once, and checks it against a plain counter model.
//!
//! # Test Properties
//!
//! 1. **Bounds**: occupancy stays within `0..=capacity`
//! 2. **Blocking**: an operation is pending exactly when the model says the
//!    queue is full (enqueue) or empty (dequeue)
//! 3. **Accounting**: occupancy always equals preload + admitted - removed

#![cfg(test)]

use futures::FutureExt;
use proptest::prelude::*;

use super::bounded::{BoundedQueue, Token};

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for (capacity, preload) pairs with preload <= capacity.
fn queue_shape_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=32).prop_flat_map(|capacity| (Just(capacity), 0..=capacity))
}

/// Strategy for operation sequences; `true` is an enqueue.
fn ops_strategy() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), 0..256)
}

// =============================================================================
// Occupancy Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_occupancy_tracks_model((capacity, preload) in queue_shape_strategy(), ops in ops_strategy()) {
        let queue = BoundedQueue::with_preload(capacity, preload).unwrap();
        let mut model = preload;

        prop_assert_eq!(queue.occupancy(), preload);

        for enqueue in ops {
            if enqueue {
                let done = queue.enqueue(Token).now_or_never().is_some();
                prop_assert_eq!(done, model < capacity);
                if done {
                    model += 1;
                }
            } else {
                let done = queue.dequeue().now_or_never().is_some();
                prop_assert_eq!(done, model > 0);
                if done {
                    model -= 1;
                }
            }

            prop_assert!(queue.occupancy() <= queue.capacity());
            prop_assert_eq!(queue.occupancy(), model);
        }
    }
}
