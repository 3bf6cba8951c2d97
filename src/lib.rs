//! Queue Telemetry - Synthetic Metrics Generator
//!
//! Produces plausible, continuously changing values for a fixed set of
//! Prometheus instruments so that dashboards, alerting rules and storage
//! backends can be exercised without a real workload behind them.
//!
//! # Architecture
//!
//! ```text
//! Producer ─┐                    ┌─ RequestCounterLoop ─┐
//!           ├─ BoundedQueue ─┐   ├─ ObserveLoop (hist) ─┤
//! Consumer ─┘                │   └─ ObserveLoop (sum) ──┤
//!                    DepthSampler ──────────────────────┤
//!                                                       ▼
//!                                          Registry ── GET /metrics
//! ```
//!
//! The queue simulation is the only part with real coordination: a bounded
//! buffer with a blocking producer and consumer whose occupancy is sampled
//! into a gauge. Everything else is a stateless periodic loop.
//!
//! # Modules
//!
//! - [`error`] - Error types
//! - [`queue`] - Bounded blocking queue
//! - [`simulation`] - Producer, consumer and depth sampler
//! - [`telemetry`] - Instruments, emit loops and the exposition server

pub mod error;
pub mod queue;
pub mod simulation;
pub mod telemetry;

// Re-export commonly used types
pub use error::{Error, Result};
pub use queue::{BoundedQueue, Token};
pub use simulation::{QueueSimulation, SimulationConfig};
pub use telemetry::{EmitConfig, Instruments, Summary, TelemetryConfig};
