//! Per-request admission and forwarding pipeline.
//!
//! # Stages
//! ```text
//! peer address → ClientIdentity
//!     → health path (GET/HEAD answered locally)
//!     → RequestValidator (405 / 400 / 413)
//!     → body cap
//!     → AuthGuard block check (403)
//!     → AuthGuard credential check (401)
//!     → RateLimiter (429)
//!     → ForwardingEngine (origin status, or 502 / 504 / 413)
//! ```
//!
//! The pipeline owns the service objects and nothing else; all per-client
//! state lives inside them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderValue, Method, Request};
use axum::response::{IntoResponse, Response};

use crate::config::GatewayConfig;
use crate::forward::{EngineError, ForwardingEngine};
use crate::http::request::request_id_of;
use crate::http::response::{health_response, GatewayError};
use crate::net::ClientIdentity;
use crate::observability::metrics;
use crate::security::auth::credential_candidates;
use crate::security::headers::ForwardingContext;
use crate::security::limits::cap_body;
use crate::security::validation::request_host;
use crate::security::{AuthGuard, RateLimiter, RequestValidator};

pub struct Pipeline {
    validator: RequestValidator,
    auth: Arc<AuthGuard>,
    limiter: Option<Arc<RateLimiter>>,
    engine: ForwardingEngine,
    health_path: String,
}

impl Pipeline {
    pub fn new(
        validator: RequestValidator,
        auth: Arc<AuthGuard>,
        limiter: Option<Arc<RateLimiter>>,
        engine: ForwardingEngine,
        health_path: impl Into<String>,
    ) -> Self {
        Self {
            validator,
            auth,
            limiter,
            engine,
            health_path: health_path.into(),
        }
    }

    /// Build every service object from a validated config.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, EngineError> {
        let engine = ForwardingEngine::new(&config.origin, config.observability.debug_mode)?;
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(RateLimiter::new(&config.rate_limit)));

        Ok(Self::new(
            RequestValidator::new(&config.request),
            Arc::new(AuthGuard::new(&config.auth)),
            limiter,
            engine,
            config.request.health_path.clone(),
        ))
    }

    pub fn auth(&self) -> &Arc<AuthGuard> {
        &self.auth
    }

    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.limiter.as_ref()
    }

    /// Run `request` through every stage and produce the client response.
    pub async fn handle(&self, peer: SocketAddr, is_tls: bool, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();

        let response = match self.process(peer, is_tls, request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }

    async fn process(
        &self,
        peer: SocketAddr,
        is_tls: bool,
        request: Request<Body>,
    ) -> Result<Response, GatewayError> {
        let client = ClientIdentity::from_peer(peer);

        if self.is_health_check(&request) {
            return Ok(health_response());
        }

        let request_id = request_id_of(&request).unwrap_or("-").to_string();
        let reject = |err: GatewayError| {
            metrics::record_rejection(err.reason());
            tracing::warn!(
                client = %client,
                request_id = %request_id,
                reason = err.reason(),
                status = err.status().as_u16(),
                "Request rejected"
            );
            err
        };

        self.validator.validate(&request).map_err(reject)?;
        let request = cap_body(request, self.validator.max_body_size());

        if self.auth.check_blocked(&client) {
            return Err(reject(GatewayError::Blocked));
        }
        if !self
            .auth
            .authenticate(&client, &credential_candidates(request.headers()))
        {
            return Err(reject(GatewayError::Unauthorized));
        }

        if let Some(limiter) = &self.limiter {
            if !limiter.admit(&client) {
                return Err(reject(GatewayError::RateLimited));
            }
        }

        let ctx = ForwardingContext {
            inbound_host: request_host(&request).and_then(|h| HeaderValue::from_str(h).ok()),
            client,
            is_tls,
        };

        tracing::debug!(
            client = %ctx.client,
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
            "Forwarding request"
        );

        let result = self.engine.forward(request, &ctx).await;
        if let Err(err) = &result {
            metrics::record_rejection(err.reason());
        }
        result
    }

    fn is_health_check(&self, request: &Request<Body>) -> bool {
        request.uri().path() == self.health_path
            && (request.method() == Method::GET || request.method() == Method::HEAD)
    }
}
