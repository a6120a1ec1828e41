//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (request ID, tracing, timeout, security headers)
//! - Bind plain or TLS listeners with graceful shutdown
//! - Bound how long and how large a request head may be
//! - Run the janitor alongside the server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    response::Response,
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::{set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::forward::EngineError;
use crate::http::pipeline::Pipeline;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown;
use crate::security::headers::{HSTS_VALUE, SECURITY_HEADERS};
use crate::security::janitor::Janitor;

/// How long in-flight TLS connections may drain after shutdown starts.
const TLS_DRAIN_WINDOW: Duration = Duration::from_secs(10);

/// Read buffer ceiling per connection, which bounds the request head size.
const MAX_HEADER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to initialise forwarding: {0}")]
    Engine(#[from] EngineError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub is_tls: bool,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    pipeline: Arc<Pipeline>,
}

impl HttpServer {
    /// Create a new server. The config must already be validated.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let pipeline = Arc::new(Pipeline::from_config(&config)?);

        let state = AppState {
            pipeline: pipeline.clone(),
            is_tls: config.listener.tls.is_some(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            pipeline,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let is_tls = state.is_tls;

        let mut router = Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )));

        for (name, value) in SECURITY_HEADERS.iter() {
            router = router.layer(SetResponseHeaderLayer::overriding(
                name.clone(),
                HeaderValue::from_static(*value),
            ));
        }
        if is_tls {
            router = router.layer(SetResponseHeaderLayer::overriding(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static(HSTS_VALUE),
            ));
        }

        router
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server on a plain TCP listener until `shutdown` fires, then
    /// drain open connections.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.spawn_janitor(shutdown.resubscribe());

        let header_read_timeout = Duration::from_secs(self.config.timeouts.header_read_secs);
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            tracing::warn!(error = %err, "Failed to accept connection");
                            continue;
                        }
                    };
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        self.router.clone(),
                        header_read_timeout,
                        shutdown.resubscribe(),
                    ));
                }
            }
        }

        drop(listener);
        tracing::info!(open = connections.len(), "HTTP server draining connections");
        while connections.join_next().await.is_some() {}

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        self.spawn_janitor(shutdown.resubscribe());

        let handle = Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown::wait(shutdown).await;
            drain.graceful_shutdown(Some(TLS_DRAIN_WINDOW));
        });

        let header_read_timeout = Duration::from_secs(self.config.timeouts.header_read_secs);
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut server = axum_server::bind_rustls(addr, tls).handle(handle);
        server
            .http_builder()
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(header_read_timeout)
            .max_buf_size(MAX_HEADER_BYTES);
        server.serve(app).await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn spawn_janitor(&self, shutdown: broadcast::Receiver<()>) {
        let interval = self.config.rate_limit.cleanup_interval_secs;
        if interval == 0 {
            return;
        }

        let janitor = Janitor::new(
            self.pipeline.limiter().cloned(),
            self.pipeline.auth().clone(),
            Duration::from_secs(interval),
            Duration::from_secs(self.config.rate_limit.idle_ttl_secs),
        );
        tokio::spawn(janitor.run(shutdown));
    }
}

/// Serve one plain-text connection over HTTP/1.1.
///
/// The peer address is attached as `ConnectInfo` so the handler sees it the
/// same way on both listeners. A client that hangs up mid-request closes the
/// connection, which drops the in-flight origin call with it.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    header_read_timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().oneshot(request)
    });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout)
        .max_buf_size(MAX_HEADER_BYTES);

    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    tracing::debug!(client = %peer, error = %err, "Connection ended with error");
                }
                break;
            }
            _ = shutdown.recv(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Catch-all handler: every request goes through the pipeline.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.pipeline.handle(peer, state.is_tls, request).await
}
