//! Queue Telemetry Integration Tests
//!
//! Runs the full wiring (instruments, queue simulation, emit loops and the
//! exposition server) on a loopback port and scrapes it over plain TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use queue_telemetry::simulation::{FixedDelay, QueueSimulation, SimulationConfig};
use queue_telemetry::telemetry::{server, spawn_emitters, EmitConfig, Instruments, TelemetryConfig};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    server: JoinHandle<queue_telemetry::Result<()>>,
}

impl Harness {
    async fn start(simulation_config: SimulationConfig) -> Self {
        let registry = Registry::new();
        let instruments = Instruments::new(&TelemetryConfig::default()).unwrap();
        instruments.register(&registry).unwrap();

        let cancel = CancellationToken::new();
        let gauge = instruments.queue_gauge(&simulation_config.queue_name);
        let simulation = QueueSimulation::with_delay(
            simulation_config,
            gauge,
            Arc::new(FixedDelay(Duration::from_millis(1))),
        )
        .unwrap();

        let mut tasks = simulation.spawn(cancel.clone());
        tasks.extend(spawn_emitters(
            &instruments,
            &EmitConfig {
                period: Duration::from_millis(10),
                ..Default::default()
            },
            cancel.clone(),
        ));

        let listener = server::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(server::serve(listener, registry, cancel.clone()));

        Self {
            addr,
            cancel,
            tasks,
            server,
        }
    }

    async fn get(&self, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();

        let status = raw
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("task should stop on cancel")
                .unwrap();
        }
        let result = tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server should stop on cancel")
            .unwrap();
        assert!(result.is_ok());
    }
}

/// Value of the first sample line containing every fragment.
fn sample_value(body: &str, fragments: &[&str]) -> Option<f64> {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .find(|line| fragments.iter().all(|f| line.contains(f)))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

fn small_simulation() -> SimulationConfig {
    SimulationConfig {
        capacity: 50,
        preload: 10,
        sample_period: Duration::from_millis(5),
        ..Default::default()
    }
}

// =============================================================================
// Exposition Tests
// =============================================================================

#[tokio::test]
async fn test_scrape_exposes_all_instruments() {
    let harness = Harness::start(small_simulation()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = harness.get("/metrics").await;
    assert_eq!(status, 200);

    assert!(body.contains("# TYPE game_g1_api_requests_total counter"));
    assert!(body.contains("# HELP game_g1_api_requests_total The total number of requests."));
    assert!(body.contains("# TYPE game_g1_message_queue_length gauge"));
    assert!(body.contains("# TYPE game_g1_request_time_histogram histogram"));
    assert!(body.contains("# TYPE game_g1_request_time_summary summary"));

    assert!(sample_value(&body, &["game_g1_message_queue_length{", "name=\"email\"", "env=\"dev\""]).is_some());
    assert!(sample_value(&body, &["game_g1_request_time_histogram_bucket{", "le=\"+Inf\""]).is_some());
    for quantile in ["0.5", "0.9", "0.95", "0.99"] {
        let label = format!("quantile=\"{}\"", quantile);
        assert!(
            sample_value(&body, &["game_g1_request_time_summary{", label.as_str()]).is_some(),
            "missing quantile {}",
            quantile
        );
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_gauge_within_capacity() {
    let harness = Harness::start(small_simulation()).await;

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let (_, body) = harness.get("/metrics").await;
        let depth = sample_value(&body, &["game_g1_message_queue_length{"]).unwrap();
        assert!((0.0..=50.0).contains(&depth), "depth {} out of bounds", depth);
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn test_counters_never_decrease_between_scrapes() {
    let harness = Harness::start(small_simulation()).await;
    let list = ["game_g1_api_requests_total{", "router=\"/user/list\""];

    let mut previous = 0.0;
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        let (_, body) = harness.get("/metrics").await;
        let current = sample_value(&body, &list).unwrap_or(0.0);
        assert!(current >= previous);
        previous = current;
    }
    assert!(previous >= 1.0);

    // Both distributions have been fed by their loops
    let (_, body) = harness.get("/metrics").await;
    let histogram = sample_value(&body, &["game_g1_request_time_histogram_count"]).unwrap();
    let summary = sample_value(&body, &["game_g1_request_time_summary_count"]).unwrap();
    assert!(histogram >= 1.0);
    assert!(summary >= 1.0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_health_and_unknown_paths() {
    let harness = Harness::start(small_simulation()).await;

    let (status, body) = harness.get("/healthz").await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok");

    let (status, _) = harness.get("/nope").await;
    assert_eq!(status, 404);

    harness.shutdown().await;
}
