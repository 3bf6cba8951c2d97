//! Exposition server
//!
//! Serves the registry in the Prometheus text format. Every scrape gathers a
//! fresh snapshot; nothing is cached between requests.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Path serving the metrics snapshot
pub const METRICS_PATH: &str = "/metrics";

/// Path answering liveness checks
pub const HEALTH_PATH: &str = "/healthz";

/// Encode the current state of every registered instrument.
///
/// Returns the content type together with the encoded body.
pub fn render(registry: &Registry) -> Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn handle(registry: &Registry, method: &Method, path: &str) -> Response<Full<Bytes>> {
    if *method != Method::GET {
        return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    match path {
        METRICS_PATH => match render(registry) {
            Ok((content_type, body)) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                if let Ok(value) = content_type.parse() {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
            }
        },
        HEALTH_PATH => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    }
}

// =============================================================================
// Accept Backoff
// =============================================================================

/// First pause after a transient accept failure
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);

/// Longest pause between accept retries
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Accept failures that clear up on their own: descriptor or buffer
/// exhaustion, and peers that went away before the handshake finished.
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    ) || is_resource_exhaustion(e)
}

#[cfg(unix)]
fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_e: &io::Error) -> bool {
    false
}

/// Exponential retry delay for the accept loop, reset on every success.
#[derive(Debug, Default)]
struct AcceptBackoff {
    delay: Option<Duration>,
}

impl AcceptBackoff {
    /// Delay to wait before accepting again, or the error if it is fatal.
    fn on_error(&mut self, e: io::Error) -> Result<Duration> {
        if !is_transient_accept_error(&e) {
            return Err(Error::Server(format!("accept error: {}", e)));
        }

        let delay = match self.delay {
            Some(previous) => (previous * 2).min(ACCEPT_BACKOFF_MAX),
            None => ACCEPT_BACKOFF_MIN,
        };
        self.delay = Some(delay);
        warn!("Metrics server accept error: {}; retrying in {:?}", e, delay);
        Ok(delay)
    }

    fn reset(&mut self) {
        self.delay = None;
    }
}

/// Parse `addr` and bind a listener on it.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let socket: SocketAddr = addr.parse().map_err(|e: std::net::AddrParseError| {
        Error::InvalidAddress {
            addr: addr.to_string(),
            reason: e.to_string(),
        }
    })?;

    TcpListener::bind(socket).await.map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Accept scrapes on `listener` until `cancel` fires.
///
/// Transient accept failures are retried with backoff; any other accept
/// failure ends the server with an error. Per-connection failures are only
/// logged.
pub async fn serve(
    listener: TcpListener,
    registry: Registry,
    cancel: CancellationToken,
) -> Result<()> {
    let local = listener.local_addr()?;
    info!("Metrics server listening on {}", local);

    let mut backoff = AcceptBackoff::default();

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Metrics server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => {
                backoff.reset();
                conn
            }
            Err(e) => {
                let delay = backoff.on_error(e)?;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Metrics server shutting down");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
        };

        debug!(%peer, "Accepted scrape connection");
        let io = TokioIo::new(stream);
        let registry = registry.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = handle(&registry, req.method(), req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("Metrics server connection error: {}", e);
            }
        });
    }
}
