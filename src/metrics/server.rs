//! Prometheus metrics and inspection HTTP server
//!
//! Serves:
//!
//! | Path | Body |
//! |------|------|
//! | `GET /metrics` | Prometheus text format |
//! | `GET /health` | `{"status":"ok"}` |
//! | `GET /queue` | [`QueueSnapshot`](crate::upload::QueueSnapshot) of the attached upload queue |
//! | `GET /uploads` | [`UploadItem`](crate::upload::UploadItem) list of the attached upload queue |
//! | `GET /registry` | [`RegistryInfo`](crate::registry::RegistryInfo) list of the attached resolver |
//!
//! # Example
//!
//! ```no_run
//! use cms_admin_core::metrics::server::MetricsServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = MetricsServer::builder().address("127.0.0.1:9090").build()?;
//!     let addr = server.start().await?;
//!     println!("Metrics server listening on {}", addr);
//!     Ok(())
//! }
//! ```

use crate::registry::WidgetRegistryResolver;
use crate::upload::UploadQueueManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Configuration for the metrics server
#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:9090")
    pub address: String,
}

/// Components exposed on the inspection endpoints
#[derive(Clone, Default)]
struct Inspect {
    queue: Option<UploadQueueManager>,
    registry: Option<Arc<WidgetRegistryResolver>>,
}

/// Builder for MetricsServer
#[derive(Default)]
pub struct MetricsServerBuilder {
    address: Option<String>,
    inspect: Inspect,
}

impl MetricsServerBuilder {
    /// Set the server address
    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Expose an upload queue on `/queue`
    pub fn upload_queue(mut self, queue: UploadQueueManager) -> Self {
        self.inspect.queue = Some(queue);
        self
    }

    /// Expose a widget registry on `/registry`
    pub fn registry(mut self, registry: Arc<WidgetRegistryResolver>) -> Self {
        self.inspect.registry = Some(registry);
        self
    }

    /// Build the MetricsServer
    pub fn build(self) -> Result<MetricsServer, MetricsServerError> {
        let address = self
            .address
            .ok_or_else(|| MetricsServerError::ConfigError("Address is required".into()))?;

        let mut server = MetricsServer::new(MetricsServerConfig { address });
        server.inspect = self.inspect;
        Ok(server)
    }
}

/// Metrics server error
#[derive(Debug, thiserror::Error)]
pub enum MetricsServerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Prometheus metrics and inspection HTTP server
pub struct MetricsServer {
    config: MetricsServerConfig,
    inspect: Inspect,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MetricsServer {
    /// Create a new metrics server with no inspection endpoints attached
    pub fn new(config: MetricsServerConfig) -> Self {
        Self {
            config,
            inspect: Inspect::default(),
            shutdown_tx: None,
            server_handle: None,
        }
    }

    /// Create a builder for MetricsServer
    pub fn builder() -> MetricsServerBuilder {
        MetricsServerBuilder::default()
    }

    /// Start the metrics server
    ///
    /// Returns the actual bound address (useful when using port 0)
    pub async fn start(&mut self) -> Result<SocketAddr, MetricsServerError> {
        let listener = TcpListener::bind(&self.config.address).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let inspect = self.inspect.clone();
        let handle = tokio::spawn(async move {
            run_server(listener, inspect, shutdown_rx).await;
        });

        self.server_handle = Some(handle);
        tracing::info!(%addr, "Metrics server listening");

        Ok(addr)
    }

    /// Shutdown the metrics server
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
    }
}

/// Run the HTTP server loop
async fn run_server(listener: TcpListener, inspect: Inspect, mut shutdown_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let io = TokioIo::new(stream);
                        let inspect = inspect.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let inspect = inspect.clone();
                                async move { handle_request(req, &inspect) }
                            });
                            let _ = http1::Builder::new()
                                .serve_connection(io, service)
                                .await;
                        });
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Metrics server accept failed");
                        continue;
                    }
                }
            }
        }
    }
}

/// Handle HTTP requests
fn handle_request(
    req: Request<hyper::body::Incoming>,
    inspect: &Inspect,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => metrics_handler(),
        (&Method::GET, "/health") => json_response(StatusCode::OK, &Health { status: "ok" }),
        (&Method::GET, "/queue") => match &inspect.queue {
            Some(queue) => json_response(StatusCode::OK, &queue.snapshot()),
            None => not_found_handler(),
        },
        (&Method::GET, "/uploads") => match &inspect.queue {
            Some(queue) => json_response(StatusCode::OK, &queue.uploads()),
            None => not_found_handler(),
        },
        (&Method::GET, "/registry") => match &inspect.registry {
            Some(registry) => json_response(StatusCode::OK, &registry.registry_info()),
            None => not_found_handler(),
        },
        _ => not_found_handler(),
    };
    Ok(response)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

fn build(status: StatusCode, content_type: &str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Ok(value) = hyper::header::HeaderValue::from_str(content_type) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

/// Handle /metrics endpoint
fn metrics_handler() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return build(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            Bytes::from("Failed to encode metrics"),
        );
    }

    build(StatusCode::OK, encoder.format_type(), Bytes::from(buffer))
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => build(status, "application/json", Bytes::from(bytes)),
        Err(_) => build(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            Bytes::from("Failed to encode response"),
        ),
    }
}

/// Handle unknown endpoints
fn not_found_handler() -> Response<Full<Bytes>> {
    build(StatusCode::NOT_FOUND, "text/plain", Bytes::from("Not Found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = MetricsServerConfig {
            address: "127.0.0.1:9090".to_string(),
        };
        assert_eq!(config.address, "127.0.0.1:9090");
    }

    #[test]
    fn test_builder_missing_address() {
        let result = MetricsServerBuilder::default().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_with_address() {
        let result = MetricsServerBuilder::default()
            .address("127.0.0.1:9090")
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(not_found_handler().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_json_response_content_type() {
        let response = json_response(StatusCode::OK, &Health { status: "ok" });
        assert_eq!(
            response.headers()[hyper::header::CONTENT_TYPE],
            "application/json"
        );
    }
}
