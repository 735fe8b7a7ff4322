use reqwest::Url;
use std::time::Duration;
use teamintro_core::gateway::DEFAULT_API_BASE;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_base: String,
    /// Per-request timeout. `None` lets requests wait indefinitely.
    pub request_timeout: Option<Duration>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_base =
            std::env::var("TEAMINTRO_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        validate_api_base(&api_base)?;

        let request_timeout = match std::env::var("TEAMINTRO_REQUEST_TIMEOUT_SECS") {
            Ok(raw) => Some(parse_timeout(&raw)?),
            Err(_) => None,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_base,
            request_timeout,
            log_level,
        })
    }

    /// Replaces the API base, e.g. from a command-line flag.
    pub fn with_api_base(mut self, api_base: String) -> Result<Self, ConfigError> {
        validate_api_base(&api_base)?;
        self.api_base = api_base;
        Ok(self)
    }
}

fn validate_api_base(api_base: &str) -> Result<(), ConfigError> {
    let valid = Url::parse(api_base).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
    });
    if !valid {
        return Err(ConfigError::InvalidValue(
            "TEAMINTRO_API_BASE".to_string(),
            format!("'{}' is not an http(s) URL", api_base),
        ));
    }
    Ok(())
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue(
            "TEAMINTRO_REQUEST_TIMEOUT_SECS".to_string(),
            format!("'{}' is not a positive number of seconds", raw),
        )),
    }
}
