// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::service::service_fn;
use hyper::{http, Method, Request, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::collector;
use crate::http_utils::{create_http_response, log_and_create_http_response, HttpResponse};
use crate::snapshot::SnapshotCache;

pub const HEALTH_PATH: &str = "/health";
pub const READY_PATH: &str = "/ready";
pub const METRICS_PATH: &str = "/metrics";

const HEALTH_CHECK_URL: &str = "https://clients3.google.com/generate_204";
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Outbound connectivity check behind `/health`
#[async_trait]
pub trait HealthProbe {
    async fn check(&self) -> Result<(), String>;
}

/// Succeeds when any HTTP response comes back from a well-known endpoint.
pub struct InternetHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl InternetHealthProbe {
    pub fn new() -> Result<Self, speedtest_net::Error> {
        Self::with_url(HEALTH_CHECK_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self, speedtest_net::Error> {
        Ok(Self {
            client: speedtest_net::build_client(HEALTH_CHECK_TIMEOUT)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl HealthProbe for InternetHealthProbe {
    async fn check(&self) -> Result<(), String> {
        self.client
            .get(&self.url)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// HTTP front of the exporter: health, readiness and the metrics exposition.
#[derive(Clone)]
pub struct ExporterServer {
    cache: Arc<SnapshotCache>,
    registry: Arc<Registry>,
    health: Arc<dyn HealthProbe + Send + Sync>,
}

impl ExporterServer {
    pub fn new(
        cache: Arc<SnapshotCache>,
        registry: Registry,
        health: Arc<dyn HealthProbe + Send + Sync>,
    ) -> Self {
        Self {
            cache,
            registry: Arc::new(registry),
            health,
        }
    }

    /// Accepts connections on `listener` until `cancel` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut server = hyper::server::conn::http1::Builder::new();
        server
            .timer(TokioTimer::new())
            .header_read_timeout(HEADER_READ_TIMEOUT);
        let mut joinset = tokio::task::JoinSet::new();

        let service = service_fn(move |req| {
            // called for each http request
            let exporter = self.clone();
            async move { exporter.endpoint_handler(req).await }
        });

        if let Ok(addr) = listener.local_addr() {
            debug!("Speedtest exporter listening on {addr}");
        }

        loop {
            let conn = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    debug!("Connection error: {e}");
                }
            });
        }

        joinset.shutdown().await;
        debug!("Speedtest exporter HTTP server stopped");
        Ok(())
    }

    pub async fn endpoint_handler<B>(&self, req: Request<B>) -> http::Result<HttpResponse> {
        let (method, path) = (req.method().clone(), req.uri().path().to_owned());
        drop(req);
        match (&method, path.as_str()) {
            (&Method::GET, HEALTH_PATH) => self.health().await,
            (&Method::GET, READY_PATH) => self.ready(),
            (&Method::GET, METRICS_PATH) => self.metrics(),
            (_, HEALTH_PATH | READY_PATH | METRICS_PATH) => {
                log_and_create_http_response("Method not allowed", StatusCode::METHOD_NOT_ALLOWED)
            }
            _ => log_and_create_http_response("Not found", StatusCode::NOT_FOUND),
        }
    }

    async fn health(&self) -> http::Result<HttpResponse> {
        match self.health.check().await {
            Ok(()) => log_and_create_http_response("OK", StatusCode::OK),
            Err(e) => {
                debug!("Health check failed: {e}");
                log_and_create_http_response(
                    "No Internet Connection",
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }

    fn ready(&self) -> http::Result<HttpResponse> {
        if !self.cache.is_ready() {
            return log_and_create_http_response("not ready", StatusCode::SERVICE_UNAVAILABLE);
        }
        log_and_create_http_response("ok\n", StatusCode::OK)
    }

    fn metrics(&self) -> http::Result<HttpResponse> {
        if !self.cache.is_ready() {
            return log_and_create_http_response(
                "metrics not ready",
                StatusCode::SERVICE_UNAVAILABLE,
            );
        }
        match collector::render(&self.registry) {
            Ok((content_type, body)) => create_http_response(body, &content_type, StatusCode::OK),
            Err(e) => log_and_create_http_response(
                &format!("Error encoding metrics: {e}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }
}
