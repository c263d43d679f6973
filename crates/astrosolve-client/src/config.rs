//! Configuration for the astrosolve runner
//!
//! Values come from environment variables (a `.env` file is honored by the
//! binary). Malformed optional values are logged and ignored; the API key is
//! the only required setting.

use std::env;

use astrosolve_core::PollPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::remote_gateway::NovaGatewayConfig;

/// Errors raised while loading the configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVariable(&'static str),
}

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the astrometry.net instance
    #[serde(default = "default_service_url")]
    pub service_url: String,

    /// API key exchanged for a session at login
    #[serde(default)]
    pub api_key: String,

    /// Timeout in seconds for each HTTP request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Whether uploaded images are visible to other users
    #[serde(default)]
    pub publicly_visible: bool,

    /// Polling schedule for submissions and jobs
    #[serde(default)]
    pub poll: PollPolicy,

    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_service_url() -> String {
    "http://nova.astrometry.net".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            publicly_visible: false,
            poll: PollPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, value: &str, target: &mut T) {
    match value.trim().parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!("Invalid {} value: {}", name, value),
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("ASTROMETRY_API_URL") {
            config.service_url = url.trim_end_matches('/').to_string();
        }

        match lookup("ASTROMETRY_API_KEY") {
            Some(key) if !key.trim().is_empty() => config.api_key = key.trim().to_string(),
            _ => return Err(ConfigError::MissingVariable("ASTROMETRY_API_KEY")),
        }

        if let Some(timeout) = lookup("ASTROMETRY_TIMEOUT_SECS") {
            parse_or_warn("ASTROMETRY_TIMEOUT_SECS", &timeout, &mut config.timeout_secs);
        }

        if let Some(visible) = lookup("ASTROMETRY_PUBLICLY_VISIBLE") {
            config.publicly_visible = parse_flag(&visible);
        }

        if let Some(attempts) = lookup("ASTROMETRY_POLL_MAX_ATTEMPTS") {
            parse_or_warn("ASTROMETRY_POLL_MAX_ATTEMPTS", &attempts, &mut config.poll.max_attempts);
        }

        if let Some(interval) = lookup("ASTROMETRY_POLL_INTERVAL_MS") {
            parse_or_warn("ASTROMETRY_POLL_INTERVAL_MS", &interval, &mut config.poll.interval_ms);
        }

        if let Some(backoff) = lookup("ASTROMETRY_POLL_BACKOFF") {
            config.poll.exponential_backoff = parse_flag(&backoff);
        }

        if let Some(max_interval) = lookup("ASTROMETRY_POLL_MAX_INTERVAL_MS") {
            parse_or_warn(
                "ASTROMETRY_POLL_MAX_INTERVAL_MS",
                &max_interval,
                &mut config.poll.max_interval_ms,
            );
        }

        config.log_level = Self::log_level_from(&lookup);

        Ok(config)
    }

    /// Log level from `LOG_LEVEL`, readable before the rest of the configuration
    /// so the subscriber can be installed first
    pub fn log_level_from<F>(lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("LOG_LEVEL")
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(default_log_level)
    }

    /// Settings for the HTTP gateway
    pub fn gateway_config(&self) -> NovaGatewayConfig {
        NovaGatewayConfig {
            service_url: self.service_url.clone(),
            timeout_secs: self.timeout_secs,
            publicly_visible: self.publicly_visible,
        }
    }
}
