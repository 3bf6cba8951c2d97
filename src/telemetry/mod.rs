//! Telemetry module
//!
//! Instrument definitions, the summary collector, the periodic emit loops
//! and the HTTP exposition endpoint.

mod emitters;
mod instruments;
pub mod server;
mod summary;

pub use emitters::{spawn_emitters, EmitConfig, Observe, ObserveLoop, RequestCounterLoop};
pub use instruments::{
    Instruments, TelemetryConfig, QUEUE_LABELS, REQUEST_LABELS, SUMMARY_OBJECTIVES,
};
pub use summary::{Summary, SummaryOpts, DEFAULT_AGE_BUCKETS, DEFAULT_MAX_AGE};
