//! Bounded Queue
//!
//! A fixed-capacity FIFO of interchangeable tokens. Both ends suspend the
//! caller instead of failing: `enqueue` waits while the queue is full and
//! `dequeue` waits while it is empty. `occupancy` is a lock-free snapshot
//! that may be stale by the time the caller uses it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};

// =============================================================================
// Token
// =============================================================================

/// An opaque unit of work. Carries no identity and no payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Token;

// =============================================================================
// Bounded Queue
// =============================================================================

/// Fixed-capacity blocking queue of [`Token`]s.
///
/// Invariant: `0 <= occupancy() <= capacity()` at every instant.
pub struct BoundedQueue {
    capacity: usize,
    buffer: Mutex<VecDeque<Token>>,
    /// Mirror of `buffer.len()`, written only while `buffer` is locked.
    len: AtomicUsize,
    not_full: Notify,
    not_empty: Notify,
}

impl BoundedQueue {
    /// Create an empty queue with the given capacity
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_preload(capacity, 0)
    }

    /// Create a queue already holding `preload` tokens.
    ///
    /// Fails if `capacity` is zero or `preload` exceeds `capacity`.
    pub fn with_preload(capacity: usize, preload: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("queue capacity must be at least 1".into()));
        }
        if preload > capacity {
            return Err(Error::Config(format!(
                "queue preload {} exceeds capacity {}",
                preload, capacity
            )));
        }

        let mut buffer = VecDeque::with_capacity(capacity);
        buffer.extend(std::iter::repeat(Token).take(preload));

        Ok(Self {
            capacity,
            buffer: Mutex::new(buffer),
            len: AtomicUsize::new(preload),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        })
    }

    /// Maximum number of tokens the queue holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of tokens in the queue.
    ///
    /// Never waits on the producer or consumer.
    pub fn occupancy(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Returns true if the queue holds no tokens
    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    /// Returns true if the queue is at capacity
    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity
    }

    /// Admit a token if there is room, otherwise hand it back.
    pub fn try_enqueue(&self, token: Token) -> std::result::Result<(), Token> {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.capacity {
                return Err(token);
            }
            buffer.push_back(token);
            self.len.store(buffer.len(), Ordering::Release);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove a token if one is available.
    pub fn try_dequeue(&self) -> Option<Token> {
        let token = {
            let mut buffer = self.buffer.lock();
            let token = buffer.pop_front()?;
            self.len.store(buffer.len(), Ordering::Release);
            token
        };
        self.not_full.notify_one();
        Some(token)
    }

    /// Admit a token, suspending the caller while the queue is full.
    ///
    /// Dropping the returned future before it completes leaves the queue
    /// untouched.
    pub async fn enqueue(&self, mut token: Token) {
        loop {
            // Register interest before checking so a dequeue between the
            // check and the await is not missed.
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_enqueue(token) {
                Ok(()) => return,
                Err(rejected) => token = rejected,
            }

            notified.await;
        }
    }

    /// Remove a token, suspending the caller while the queue is empty.
    pub async fn dequeue(&self) -> Token {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(token) = self.try_dequeue() {
                return token;
            }

            notified.await;
        }
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("occupancy", &self.occupancy())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
