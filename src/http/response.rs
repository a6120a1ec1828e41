//! Client-visible rejections and upstream failure mapping.
//!
//! # Responsibilities
//! - One error type for every way the gateway refuses or fails a request
//! - Map each to a status code, a fixed generic body and required headers
//!
//! # Design Decisions
//! - Bodies never carry origin or transport error details
//! - Rejection headers (Retry-After, WWW-Authenticate) are attached here so no
//!   call site can forget them

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Challenge sent with every 401.
pub const WWW_AUTHENTICATE_CHALLENGE: &str = r#"Bearer realm="proxy""#;

/// Seconds a rate-limited client is told to wait.
pub const RETRY_AFTER_SECS: u64 = 60;

/// Every way a request can be refused or fail inside the gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("host not allowed")]
    HostMismatch,

    #[error("path traversal attempt")]
    PathTraversal,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("missing or invalid credential")]
    Unauthorized,

    #[error("client is blocked")]
    Blocked,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("origin did not answer in time")]
    GatewayTimeout,

    #[error("origin unreachable")]
    BadGateway,

    #[error("internal error")]
    Internal,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::HostMismatch | GatewayError::PathTraversal => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::Blocked => StatusCode::FORBIDDEN,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BadGateway => StatusCode::BAD_GATEWAY,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::MethodNotAllowed => "method",
            GatewayError::HostMismatch => "host",
            GatewayError::PathTraversal => "path",
            GatewayError::PayloadTooLarge => "body_size",
            GatewayError::Unauthorized => "auth",
            GatewayError::Blocked => "blocked",
            GatewayError::RateLimited => "rate_limit",
            GatewayError::GatewayTimeout => "upstream_timeout",
            GatewayError::BadGateway => "upstream_error",
            GatewayError::Internal => "internal",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let text = status.canonical_reason().unwrap_or("Error");

        let mut response = Response::new(Body::from(text));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        match self {
            GatewayError::RateLimited => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
            }
            GatewayError::Unauthorized => {
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(WWW_AUTHENTICATE_CHALLENGE),
                );
            }
            _ => {}
        }
        response
    }
}

/// Fixed answer for the health path.
pub fn health_response() -> Response {
    (StatusCode::OK, "OK").into_response()
}
