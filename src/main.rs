//! Queue Telemetry
//!
//! Synthetic telemetry generator for exercising a Prometheus/Grafana
//! pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Queue Telemetry                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Queue     │───▶│   Registry   │───▶│   /metrics   │       │
//! │  │  Simulation  │    │              │    │   endpoint   │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │  ┌──────────────┐           ▲                                    │
//! │  │  Emit Loops  │───────────┘                                    │
//! │  └──────────────┘                                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use queue_telemetry::error::Result;
use queue_telemetry::simulation::{QueueSimulation, SimulationConfig};
use queue_telemetry::telemetry::{server, spawn_emitters, EmitConfig, Instruments, TelemetryConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Queue Telemetry - synthetic metrics for Prometheus scraping
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "192.168.192.100:60000")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Queue Telemetry");
    info!("  Metrics address: {}", args.metrics_addr);

    // Build and register instruments
    let registry = Registry::new();
    let instruments = Instruments::new(&TelemetryConfig::default())?;
    instruments.register(&registry)?;

    // Bind before spawning anything; a failed bind is fatal
    let listener = server::bind(&args.metrics_addr).await.map_err(|e| {
        error!("{}", e);
        e
    })?;

    let cancel = CancellationToken::new();

    // Queue simulation
    let simulation_config = SimulationConfig::default();
    let gauge = instruments.queue_gauge(&simulation_config.queue_name);
    let simulation = QueueSimulation::new(simulation_config, gauge)?;
    let mut tasks = simulation.spawn(cancel.clone());

    // Counter, histogram and summary loops
    tasks.extend(spawn_emitters(
        &instruments,
        &EmitConfig::default(),
        cancel.clone(),
    ));

    info!("Simulation tasks started");

    let result = tokio::select! {
        result = server::serve(listener, registry, cancel.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task failed during shutdown: {}", e);
        }
    }

    if let Err(e) = &result {
        error!("Metrics server failed: {}", e);
    }
    info!("Shutdown complete");
    result
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
