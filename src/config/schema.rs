//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The single origin requests are forwarded to.
    pub origin: OriginConfig,

    /// Shared-secret authentication and IP blocking.
    pub auth: AuthConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Admission rules applied to every inbound request.
    pub request: RequestConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Optional TLS configuration. When set the listener speaks HTTPS only.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// How strictly the gateway verifies the origin's TLS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    /// Restricted cipher suites and curves, verified certificates.
    #[default]
    Strong,
    /// Provider default suites, verified certificates.
    Relaxed,
    /// No certificate verification at all.
    Insecure,
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustTier::Strong => f.write_str("strong"),
            TrustTier::Relaxed => f.write_str("relaxed"),
            TrustTier::Insecure => f.write_str("insecure"),
        }
    }
}

/// Origin (backend) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Base URL of the origin (e.g., "https://internal.example:8443").
    pub target_url: String,

    /// TLS trust tier used when the origin speaks HTTPS.
    pub trust_tier: TrustTier,

    /// Extra PEM trust anchors for the origin, on top of the system roots.
    pub ca_cert_path: Option<String>,

    /// Maximum idle pooled connections kept to the origin.
    pub max_idle_connections: usize,

    /// How long an idle pooled connection is kept, in seconds.
    pub idle_timeout_secs: u64,

    /// Deadline for TCP connect plus TLS handshake, in seconds.
    pub handshake_timeout_secs: u64,

    /// Deadline for the origin's response head, in seconds.
    pub response_timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            trust_tier: TrustTier::Strong,
            ca_cert_path: None,
            max_idle_connections: 100,
            idle_timeout_secs: 90,
            handshake_timeout_secs: 10,
            response_timeout_secs: 30,
        }
    }
}

/// Authentication configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret. Empty disables authentication.
    pub token: String,

    /// Consecutive failures before a client is blocked.
    pub max_attempts: u32,

    /// How long a blocked client stays blocked, in seconds.
    pub block_duration_secs: u64,

    /// Hard ceiling on clients with tracked failures.
    pub max_clients: usize,
}

impl AuthConfig {
    /// Whether a secret is configured.
    pub fn enabled(&self) -> bool {
        !self.token.is_empty()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &if self.enabled() { "[redacted]" } else { "" })
            .field("max_attempts", &self.max_attempts)
            .field("block_duration_secs", &self.block_duration_secs)
            .field("max_clients", &self.max_clients)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            max_attempts: 5,
            block_duration_secs: 15 * 60,
            max_clients: 10_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per minute per client.
    pub requests_per_minute: u32,

    /// Burst capacity.
    pub burst_size: u32,

    /// Hard ceiling on tracked clients.
    pub max_clients: usize,

    /// Buckets unused for this long are swept by the janitor, in seconds.
    pub idle_ttl_secs: u64,

    /// Janitor interval in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            burst_size: 10,
            max_clients: 10_000,
            idle_ttl_secs: 30 * 60,
            cleanup_interval_secs: 5 * 60,
        }
    }
}

/// Request admission configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Exact Host the gateway answers for. Empty accepts any host.
    pub allowed_host: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Unauthenticated health check path.
    pub health_path: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            allowed_host: String::new(),
            max_body_size: 10 * 1024 * 1024, // 10MB
            health_path: "/health".to_string(),
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time until the response head) in seconds.
    pub request_secs: u64,

    /// Deadline for a client to finish sending the request head, in seconds.
    pub header_read_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 60,
            header_read_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Log header sets and a body preview for every forwarded request.
    pub debug_mode: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            debug_mode: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [origin]
            target_url = "http://127.0.0.1:3000"
            trust_tier = "relaxed"
            "#,
        )
        .unwrap();

        assert_eq!(config.origin.trust_tier, TrustTier::Relaxed);
        assert_eq!(config.origin.max_idle_connections, 100);
        assert_eq!(config.rate_limit.burst_size, 10);
        assert_eq!(config.auth.max_attempts, 5);
        assert_eq!(config.request.health_path, "/health");
    }

    #[test]
    fn debug_output_redacts_token() {
        let auth = AuthConfig {
            token: "hunter2".into(),
            ..AuthConfig::default()
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[redacted]"));
    }
}
