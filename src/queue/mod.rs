//! Queue module
//!
//! Fixed-capacity work queue whose occupancy drives the queue-length gauge.

mod bounded;
#[cfg(test)]
mod proptest;

pub use bounded::{BoundedQueue, Token};
