//! Shared pooled transport to the origin.
//!
//! One hyper-util client lives for the whole process. Its connector stack is
//! `HandshakeTimeout<HttpsConnector<HttpConnector>>`: TCP connect and the TLS
//! handshake together must finish within the handshake deadline.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use hyper::Uri;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use thiserror::Error;
use tower::Service;

use crate::config::OriginConfig;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connector stack used for every origin connection.
pub type OriginConnector = HandshakeTimeout<HttpsConnector<HttpConnector>>;

/// Pooled client shared by all requests.
pub type PooledTransport = Client<OriginConnector, Body>;

/// Connect plus handshake exceeded its deadline.
#[derive(Debug, Error)]
#[error("origin connect/handshake timed out after {0:?}")]
pub struct HandshakeTimedOut(pub Duration);

/// Wraps a connector so each connection attempt is bounded in time.
#[derive(Debug, Clone)]
pub struct HandshakeTimeout<C> {
    inner: C,
    timeout: Duration,
}

impl<C> HandshakeTimeout<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<C> Service<Uri> for HandshakeTimeout<C>
where
    C: Service<Uri> + Send + 'static,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let timeout = self.timeout;
        let connecting = self.inner.call(uri);
        Box::pin(async move {
            match tokio::time::timeout(timeout, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(Box::new(HandshakeTimedOut(timeout)) as BoxError),
            }
        })
    }
}

/// Build the shared transport from origin settings and a prepared TLS config.
pub fn build(config: &OriginConfig, tls: ClientConfig) -> PooledTransport {
    let handshake = Duration::from_secs(config.handshake_timeout_secs);

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    http.set_connect_timeout(Some(handshake));

    let https = HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.max_idle_connections)
        .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .build(HandshakeTimeout::new(https, handshake))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Connector whose attempts never finish.
    #[derive(Clone)]
    struct Stalled;

    impl Service<Uri> for Stalled {
        type Response = ();
        type Error = std::io::Error;
        type Future = std::future::Pending<Result<(), std::io::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _uri: Uri) -> Self::Future {
            std::future::pending()
        }
    }

    /// Connector that always refuses.
    #[derive(Clone)]
    struct Refused;

    impl Service<Uri> for Refused {
        type Response = ();
        type Error = std::io::Error;
        type Future = std::future::Ready<Result<(), std::io::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _uri: Uri) -> Self::Future {
            std::future::ready(Err(std::io::ErrorKind::ConnectionRefused.into()))
        }
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        let mut connector = HandshakeTimeout::new(Stalled, Duration::from_millis(50));
        let err = connector
            .call(Uri::from_static("https://origin.test"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<HandshakeTimedOut>().is_some());
    }

    #[tokio::test]
    async fn inner_errors_pass_through() {
        let mut connector = HandshakeTimeout::new(Refused, Duration::from_secs(5));
        let err = connector
            .call(Uri::from_static("http://origin.test"))
            .await
            .unwrap_err();
        let io = err.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
    }
}
