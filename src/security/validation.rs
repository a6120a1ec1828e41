//! Request admission checks.
//!
//! # Responsibilities
//! - Allow only the standard request methods
//! - Enforce the configured Host, if any
//! - Reject path traversal, including encoded and double-encoded forms
//! - Reject bodies whose declared length exceeds the limit
//!
//! # Design Decisions
//! - Rules run in a fixed order and the first failure wins
//! - Traversal is checked twice: once on the lexically resolved path and once
//!   against known attack signatures on every decode layer

use std::borrow::Cow;

use axum::http::{header, HeaderMap, Method, Request};
use percent_encoding::percent_decode_str;

use crate::config::RequestConfig;
use crate::http::response::GatewayError;

/// Maximum number of percent-decoding passes applied to a path.
const MAX_DECODE_LAYERS: usize = 3;

/// Substrings that mark a traversal attempt, matched against lower-cased input.
const TRAVERSAL_SIGNATURES: &[&str] = &[
    "..",
    "..\\",
    ".%2e",
    "%2e.",
    "%2e%2e",
    "%252e",
    "..%5c",
    "%5c..",
    "..%255c",
    "%c0%ae",
    "%c1%9c",
];

fn is_allowed_method(method: &Method) -> bool {
    [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
        Method::HEAD,
        Method::OPTIONS,
    ]
    .contains(method)
}

/// Stateless admission validator.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    allowed_host: Option<String>,
    max_body_size: usize,
}

impl RequestValidator {
    pub fn new(config: &RequestConfig) -> Self {
        let allowed_host = (!config.allowed_host.is_empty()).then(|| config.allowed_host.clone());
        Self {
            allowed_host,
            max_body_size: config.max_body_size,
        }
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Run every admission rule against `request`.
    pub fn validate<B>(&self, request: &Request<B>) -> Result<(), GatewayError> {
        if !is_allowed_method(request.method()) {
            return Err(GatewayError::MethodNotAllowed);
        }

        if let Some(allowed) = &self.allowed_host {
            let host = request_host(request);
            if host != Some(allowed.as_str()) {
                tracing::warn!(
                    host = host.unwrap_or(""),
                    expected = %allowed,
                    "Host not allowed"
                );
                return Err(GatewayError::HostMismatch);
            }
        }

        if is_traversal(request.uri().path()) {
            return Err(GatewayError::PathTraversal);
        }

        if let Some(length) = declared_length(request.headers()) {
            if length > self.max_body_size as u64 {
                return Err(GatewayError::PayloadTooLarge);
            }
        }

        Ok(())
    }
}

/// Inbound Host: the header if present, else the URI authority.
pub fn request_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// True if `raw_path` is a traversal attempt under either check.
pub fn is_traversal(raw_path: &str) -> bool {
    let layers = decode_layers(raw_path);
    layers.iter().any(|layer| matches_signature(layer))
        || layers.iter().any(|layer| escapes_root(layer))
}

/// The raw path followed by each successive percent-decoding, stopping once
/// decoding no longer changes anything.
fn decode_layers(raw: &str) -> Vec<String> {
    let mut layers = vec![raw.to_string()];
    for _ in 0..MAX_DECODE_LAYERS {
        let Some(current) = layers.last() else { break };
        let decoded = match percent_decode_str(current).decode_utf8_lossy() {
            Cow::Borrowed(_) => break,
            Cow::Owned(decoded) => decoded,
        };
        if &decoded == current {
            break;
        }
        layers.push(decoded);
    }
    layers
}

fn matches_signature(layer: &str) -> bool {
    let lower = layer.to_ascii_lowercase();
    TRAVERSAL_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Resolve `.` and `..` segments lexically and report whether the path ever
/// climbs above the root.
fn escapes_root(path: &str) -> bool {
    let mut depth: usize = 0;
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return true,
            },
            _ => depth += 1,
        }
    }
    false
}
