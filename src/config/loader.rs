//! Configuration loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "gateway.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Resolve the effective configuration for the binary.
///
/// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] is used
/// when present and built-in defaults otherwise. Environment overrides are
/// applied last, before validation.
pub fn load_effective(explicit: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => read_file(path)?,
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                read_file(fallback)?
            } else {
                GatewayConfig::default()
            }
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Apply `LISTEN`, `PORT`, `PROXY_TARGET`, `PROXY_AUTH_TOKEN` and `LOG_LEVEL`.
///
/// Empty values are ignored. The lookup is injected so tests never touch the
/// process environment.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    let (mut host, mut port) = split_host_port(&config.listener.bind_address);
    if let Some(listen) = get("LISTEN") {
        tracing::info!(listen = %listen, "LISTEN override");
        host = if listen.contains(':') && !listen.starts_with('[') {
            format!("[{}]", listen)
        } else {
            listen
        };
    }
    if let Some(p) = get("PORT") {
        tracing::info!(port = %p, "PORT override");
        port = p;
    }
    config.listener.bind_address = format!("{}:{}", host, port);

    if let Some(target) = get("PROXY_TARGET") {
        tracing::info!(target = %target, "PROXY_TARGET override");
        config.origin.target_url = target;
    }
    if let Some(token) = get("PROXY_AUTH_TOKEN") {
        tracing::info!("PROXY_AUTH_TOKEN override");
        config.auth.token = token;
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.observability.log_level = level;
    }
}

fn split_host_port(addr: &str) -> (String, String) {
    match addr.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.to_string()),
        None => (addr.to_string(), "8080".to_string()),
    }
}
