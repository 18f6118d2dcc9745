pub mod credentials;

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::mcp::protocol::{PROTOCOL_V2025_03_26, PROTOCOL_V2025_06_18};

pub const DEFAULT_BIND: &str = "127.0.0.1:5174";
pub const DEFAULT_PATH: &str = "/mcp";
pub const DEFAULT_SERVER_NAME: &str = "RimBridgeServer";
pub const DEFAULT_TICK_MS: u64 = 50;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings for the MCP endpoint and the host loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Route the MCP endpoint is mounted at, e.g. `/mcp`.
    pub path: String,
    /// Case-insensitive prefixes an `Origin` header must start with.
    pub allowed_origins: Vec<String>,
    /// Most preferred first.
    pub supported_protocol_versions: Vec<String>,
    /// Used for the call context when the client sends no version header.
    pub default_protocol_version: String,
    pub server_name: String,
    pub server_version: String,
    pub require_bearer_token: bool,
    pub static_bearer_token: Option<String>,
    /// Cadence at which the host loop drains the execution bridge.
    pub tick_interval: Duration,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 5174))),
            path: DEFAULT_PATH.to_string(),
            allowed_origins: vec!["null".into(), "file://".into(), "app://".into()],
            supported_protocol_versions: vec![
                PROTOCOL_V2025_06_18.to_string(),
                PROTOCOL_V2025_03_26.to_string(),
            ],
            default_protocol_version: PROTOCOL_V2025_03_26.to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            require_bearer_token: false,
            static_bearer_token: None,
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Builds the config from `RIMBRIDGE_*` environment variables, falling
    /// back to `~/.api-keys` for the bearer token.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok(), credentials::load_token)
    }

    /// Same as [`ServerConfig::from_env`] with the sources injected.
    ///
    /// `file_token` is only consulted when `RIMBRIDGE_TOKEN` is unset.
    pub fn from_lookup<L, F>(lookup: L, file_token: F) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
        F: FnOnce() -> Option<String>,
    {
        let mut config = ServerConfig::default();

        if let Some(bind) = lookup("RIMBRIDGE_BIND") {
            config.bind = bind.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RIMBRIDGE_BIND",
                value: bind.clone(),
            })?;
        }

        if let Some(path) = lookup("RIMBRIDGE_PATH") {
            config.path = normalize_path(&path);
        }

        if let Some(origins) = lookup("RIMBRIDGE_ALLOWED_ORIGINS") {
            config.allowed_origins = split_list(&origins);
        }

        if let Some(tick) = lookup("RIMBRIDGE_TICK_MS") {
            let ms = tick.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "RIMBRIDGE_TICK_MS",
                value: tick.clone(),
            })?;
            config.tick_interval = Duration::from_millis(ms.max(1));
        }

        if let Some(limit) = lookup("RIMBRIDGE_MAX_BODY_BYTES") {
            config.max_body_bytes = limit.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RIMBRIDGE_MAX_BODY_BYTES",
                value: limit.clone(),
            })?;
        }

        config.static_bearer_token = lookup("RIMBRIDGE_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(file_token);

        // Enforcement follows the token unless explicitly overridden.
        config.require_bearer_token = match lookup("RIMBRIDGE_REQUIRE_TOKEN") {
            Some(flag) => flag_enabled(&flag),
            None => config.static_bearer_token.is_some(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_protocol_versions.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one supported protocol version is required".to_string(),
            ));
        }

        if self.require_bearer_token && !self.token_configured() {
            return Err(ConfigError::Invalid(
                "a bearer token is required but none is configured (set RIMBRIDGE_TOKEN or ~/.api-keys)"
                    .to_string(),
            ));
        }

        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "RIMBRIDGE_PATH",
                value: self.path.clone(),
            });
        }

        Ok(())
    }

    pub fn token_configured(&self) -> bool {
        self.static_bearer_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// Logs the effective security posture once at startup.
    pub fn log_security_posture(&self) {
        if !self.require_bearer_token && !self.token_configured() {
            warn!(
                "Auth disabled: no bearer token found in RIMBRIDGE_TOKEN or ~/.api-keys (key RIMBRIDGE_TOKEN). Requests are not authenticated."
            );
        } else if !self.require_bearer_token {
            warn!("A bearer token is configured but RIMBRIDGE_REQUIRE_TOKEN disables enforcement");
        }
    }
}

fn flag_enabled(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Leading slash, no trailing slash; empty becomes `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
