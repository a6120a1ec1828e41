//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Cross-field checks (origin deadline below request deadline)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be set")]
    Missing { field: &'static str },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Validate a fully merged configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Listener
    let bind = &config.listener.bind_address;
    if bind.starts_with('*') {
        errors.push(invalid(
            "listener.bind_address",
            "wildcard '*' not allowed, use 0.0.0.0 explicitly",
        ));
    } else if bind.parse::<SocketAddr>().is_err() {
        errors.push(invalid("listener.bind_address", format!("'{}' is not host:port", bind)));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(ValidationError::Missing { field: "listener.tls.cert_path" });
        }
        if tls.key_path.is_empty() {
            errors.push(ValidationError::Missing { field: "listener.tls.key_path" });
        }
    }

    // Origin
    let origin = &config.origin;
    if origin.target_url.is_empty() {
        errors.push(ValidationError::Missing { field: "origin.target_url" });
    } else {
        match Url::parse(&origin.target_url) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => {
                errors.push(invalid("origin.target_url", "scheme must be http or https"));
            }
            Ok(url) if url.host_str().is_none() => {
                errors.push(invalid("origin.target_url", "missing host"));
            }
            Ok(_) => {}
            Err(e) => errors.push(invalid("origin.target_url", e.to_string())),
        }
    }
    if origin.idle_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "origin.idle_timeout_secs" });
    }
    if origin.handshake_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "origin.handshake_timeout_secs" });
    }
    if origin.response_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "origin.response_timeout_secs" });
    }

    // Timeouts
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.request_secs" });
    } else if origin.response_timeout_secs >= config.timeouts.request_secs {
        errors.push(invalid(
            "origin.response_timeout_secs",
            "must be lower than timeouts.request_secs",
        ));
    }

    if config.timeouts.header_read_secs == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.header_read_secs" });
    }

    // Auth
    if config.auth.enabled() {
        if config.auth.max_attempts == 0 {
            errors.push(ValidationError::Zero { field: "auth.max_attempts" });
        }
        if config.auth.block_duration_secs == 0 {
            errors.push(ValidationError::Zero { field: "auth.block_duration_secs" });
        }
        if config.auth.max_clients == 0 {
            errors.push(ValidationError::Zero { field: "auth.max_clients" });
        }
    }

    // Rate limiting
    let rl = &config.rate_limit;
    if rl.enabled {
        if rl.burst_size == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.burst_size" });
        }
        if rl.max_clients == 0 {
            errors.push(ValidationError::Zero { field: "rate_limit.max_clients" });
        }
    }
    // The janitor also expires auth state, so it must run whenever either
    // table is live.
    if (rl.enabled || config.auth.enabled()) && rl.cleanup_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.cleanup_interval_secs" });
    }

    // Request admission
    if config.request.max_body_size == 0 {
        errors.push(ValidationError::Zero { field: "request.max_body_size" });
    }
    if !config.request.health_path.starts_with('/') {
        errors.push(invalid("request.health_path", "must start with '/'"));
    }

    // Observability
    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(invalid("observability.metrics_address", "not host:port"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
