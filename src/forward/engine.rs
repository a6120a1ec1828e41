//! Request forwarding to the origin.
//!
//! # Responsibilities
//! - Rewrite the request onto the origin (scheme + authority, inbound path + query)
//! - Apply the outbound and response header policies
//! - Dispatch once through the pooled transport under a response-head deadline
//! - Map transport failures to 504 / 502 / 413
//!
//! # Design Decisions
//! - No retries; a failed attempt is reported, never replayed
//! - Bodies stream in both directions, nothing is buffered
//! - Error details stay in logs; clients get the generic status text

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{Request, Response, Uri};
use thiserror::Error;

use super::preview::{self, PREVIEW_LIMIT};
use super::tls::{self, TrustError};
use super::transport::{self, HandshakeTimedOut, PooledTransport};
use crate::config::OriginConfig;
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::security::headers::{self, ForwardingContext};
use crate::security::limits::BodyOverflow;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid origin url {url:?}: {reason}")]
    InvalidOrigin { url: String, reason: String },

    #[error(transparent)]
    Trust(#[from] TrustError),
}

/// Scheme and authority of the origin. The origin URL's own path is not used.
#[derive(Debug, Clone)]
pub struct OriginTarget {
    scheme: Scheme,
    authority: Authority,
}

impl OriginTarget {
    pub fn parse(url: &str) -> Result<Self, EngineError> {
        let invalid = |reason: &str| EngineError::InvalidOrigin {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
        let scheme = uri.scheme().cloned().ok_or_else(|| invalid("missing scheme"))?;
        if scheme != Scheme::HTTP && scheme != Scheme::HTTPS {
            return Err(invalid("scheme must be http or https"));
        }
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;

        Ok(Self { scheme, authority })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == Scheme::HTTPS
    }

    /// Origin URI for an inbound request URI.
    pub fn uri_for(&self, inbound: &Uri) -> Result<Uri, GatewayError> {
        let path_and_query = inbound
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|_| GatewayError::Internal)
    }
}

impl std::fmt::Display for OriginTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// Forwards admitted requests to the single origin.
pub struct ForwardingEngine {
    target: OriginTarget,
    client: PooledTransport,
    response_timeout: Duration,
    debug_mode: bool,
}

impl ForwardingEngine {
    pub fn new(config: &OriginConfig, debug_mode: bool) -> Result<Self, EngineError> {
        let target = OriginTarget::parse(&config.target_url)?;
        let tls = tls::client_config(config.trust_tier, config.ca_cert_path.as_deref())?;
        let client = transport::build(config, tls);

        tracing::info!(
            origin = %target,
            tls = target.is_https(),
            trust_tier = %config.trust_tier,
            max_idle = config.max_idle_connections,
            "Forwarding engine ready"
        );

        Ok(Self {
            target,
            client,
            response_timeout: Duration::from_secs(config.response_timeout_secs),
            debug_mode,
        })
    }

    /// Send `request` to the origin and stream its response back.
    pub async fn forward(
        &self,
        request: Request<Body>,
        ctx: &ForwardingContext,
    ) -> Result<Response<Body>, GatewayError> {
        let overflow = request.extensions().get::<BodyOverflow>().cloned();
        let (parts, body) = request.into_parts();

        if self.debug_mode {
            tracing::debug!(
                client = %ctx.client,
                method = %parts.method,
                uri = %parts.uri,
                headers = ?headers::redacted(&parts.headers),
                "Inbound request"
            );
        }

        let uri = self.target.uri_for(&parts.uri)?;
        let mut outbound_headers = parts.headers;
        headers::prepare_outbound(&mut outbound_headers, ctx);

        if self.debug_mode {
            tracing::debug!(
                uri = %uri,
                headers = ?headers::redacted(&outbound_headers),
                "Outbound request"
            );
        }

        // Version stays at the builder default: the origin is spoken to over HTTP/1.1.
        let mut outbound = Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(body)
            .map_err(|_| GatewayError::Internal)?;
        *outbound.headers_mut() = outbound_headers;

        let in_flight = self.client.request(outbound);
        let response = match tokio::time::timeout(self.response_timeout, in_flight).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                let mapped = classify(&err, overflow.as_ref());
                log_upstream_failure(&mapped, &err, ctx);
                return Err(mapped);
            }
            Err(_) => {
                let mapped = if overflow.as_ref().is_some_and(BodyOverflow::tripped) {
                    GatewayError::PayloadTooLarge
                } else {
                    GatewayError::GatewayTimeout
                };
                metrics::record_upstream_error(upstream_kind(&mapped));
                tracing::error!(
                    client = %ctx.client,
                    timeout_secs = self.response_timeout.as_secs(),
                    "Origin response deadline elapsed"
                );
                return Err(mapped);
            }
        };

        let (mut parts, body) = response.into_parts();
        headers::sanitize_response(&mut parts.headers);

        if self.debug_mode {
            tracing::debug!(
                status = %parts.status,
                headers = ?headers::redacted(&parts.headers),
                "Origin response"
            );
            return Ok(Response::from_parts(parts, preview::inspect(body, PREVIEW_LIMIT)));
        }

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Map a transport failure to the status the client sees.
///
/// A tripped body cap wins over everything else; otherwise any timeout in the
/// error chain means 504 and the rest is 502.
pub fn classify(err: &(dyn StdError + 'static), overflow: Option<&BodyOverflow>) -> GatewayError {
    if overflow.is_some_and(BodyOverflow::tripped) {
        return GatewayError::PayloadTooLarge;
    }

    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<HandshakeTimedOut>().is_some() {
            return GatewayError::GatewayTimeout;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::TimedOut {
                return GatewayError::GatewayTimeout;
            }
        }
        current = e.source();
    }
    GatewayError::BadGateway
}

fn upstream_kind(mapped: &GatewayError) -> &'static str {
    match mapped {
        GatewayError::GatewayTimeout => "timeout",
        GatewayError::PayloadTooLarge => "body_too_large",
        _ => "transport",
    }
}

fn log_upstream_failure(
    mapped: &GatewayError,
    err: &hyper_util::client::legacy::Error,
    ctx: &ForwardingContext,
) {
    let kind = if matches!(mapped, GatewayError::BadGateway) && err.is_connect() {
        "connect"
    } else {
        upstream_kind(mapped)
    };
    metrics::record_upstream_error(kind);

    if matches!(mapped, GatewayError::PayloadTooLarge) {
        tracing::warn!(client = %ctx.client, "Request body exceeded the cap while streaming");
    } else {
        tracing::error!(
            client = %ctx.client,
            kind,
            error = %err,
            source = ?err.source(),
            "Origin request failed"
        );
    }
}
