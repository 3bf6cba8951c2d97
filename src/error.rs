//! Error types for the telemetry generator

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while wiring or serving the telemetry generator.
///
/// Queue operations never fail; they apply backpressure by suspending the
/// caller instead. Everything here happens at construction, registration or
/// in the exposition listener.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus registry or encoder error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Listener address could not be parsed
    #[error("Invalid listen address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Listener could not be bound
    #[error("Failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Exposition server failed while accepting connections
    #[error("Metrics server error: {0}")]
    Server(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
