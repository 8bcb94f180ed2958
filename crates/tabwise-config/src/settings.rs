//! The configuration surface and its environment-variable overrides.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::logging::LogFormat;

/// Default endpoint answering page questions.
const DEFAULT_API_ENDPOINT: &str = "https://tabwise.dev/api/answer";

/// Default bound on one call's reply wait, in seconds.
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 5;

/// Default bound on one answer-API request, in seconds.
const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default tracing filter expression.
const DEFAULT_LOG_FILTER: &str = "info";

/// Answer-API settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ApiSettings {
    /// Endpoint the prompt and page content are posted to.
    pub endpoint: Url,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

/// The constant always parses; a failure here is a defect in this crate,
/// not in user input.
fn default_endpoint() -> Url {
    Url::parse(DEFAULT_API_ENDPOINT)
        .unwrap_or_else(|error| panic!("default API endpoint constant must parse: {error}"))
}

/// Persistent-storage settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StorageSettings {
    /// File backing the key-value store; `None` keeps state in memory only.
    pub path: Option<PathBuf>,
}

/// Runtime configuration shared by the caller and the endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Bound on one call's reply wait, in seconds.
    pub call_timeout_secs: u64,
    /// Answer-API settings.
    pub api: ApiSettings,
    /// Persistent-storage settings.
    pub storage: StorageSettings,
    /// Tracing filter expression.
    pub log_filter: String,
    /// Telemetry output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            api: ApiSettings::default(),
            storage: StorageSettings::default(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Loads defaults, then applies any `TABWISE_*` environment overrides.
    ///
    /// Recognised variables: `TABWISE_CALL_TIMEOUT_SECS`, `TABWISE_API_URL`,
    /// `TABWISE_API_TIMEOUT_SECS`, `TABWISE_STORAGE_PATH`,
    /// `TABWISE_LOG_FILTER`, and `TABWISE_LOG_FORMAT`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the variable whose value failed to
    /// parse.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = env_value("TABWISE_CALL_TIMEOUT_SECS") {
            config.call_timeout_secs =
                parse_secs("TABWISE_CALL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = env_value("TABWISE_API_URL") {
            config.api.endpoint =
                Url::parse(&value).map_err(|source| ConfigError::InvalidUrl {
                    variable: "TABWISE_API_URL",
                    value,
                    source,
                })?;
        }
        if let Some(value) = env_value("TABWISE_API_TIMEOUT_SECS") {
            config.api.timeout_secs = parse_secs("TABWISE_API_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = env_value("TABWISE_STORAGE_PATH") {
            config.storage.path = Some(PathBuf::from(value));
        }
        if let Some(value) = env_value("TABWISE_LOG_FILTER") {
            config.log_filter = value;
        }
        if let Some(value) = env_value("TABWISE_LOG_FORMAT") {
            config.log_format =
                value
                    .parse()
                    .map_err(|source| ConfigError::InvalidLogFormat {
                        variable: "TABWISE_LOG_FORMAT",
                        value,
                        source,
                    })?;
        }

        Ok(config)
    }

    /// Bound on one call's reply wait.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Bound on one answer-API request.
    #[must_use]
    pub const fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_secs(variable: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::InvalidSeconds {
            variable,
            value: value.to_owned(),
            source,
        })
}

/// Errors raised while applying environment overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A `*_SECS` variable did not parse as an unsigned integer.
    #[error("{variable}='{value}' is not a number of seconds: {source}")]
    InvalidSeconds {
        /// The offending variable.
        variable: &'static str,
        /// Its raw value.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: std::num::ParseIntError,
    },

    /// A URL variable did not parse.
    #[error("{variable}='{value}' is not a valid URL: {source}")]
    InvalidUrl {
        /// The offending variable.
        variable: &'static str,
        /// Its raw value.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: url::ParseError,
    },

    /// A log-format variable named no known format.
    #[error("{variable}='{value}' is not a log format: {source}")]
    InvalidLogFormat {
        /// The offending variable.
        variable: &'static str,
        /// Its raw value.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: crate::logging::LogFormatParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = Config::default();
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.api_timeout(), Duration::from_secs(30));
        assert_eq!(config.api.endpoint.as_str(), DEFAULT_API_ENDPOINT);
        assert_eq!(config.storage.path, None);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn serialises_round_trip() {
        let config = Config::default();
        let text = serde_json::to_string(&config).expect("serialise");
        let back: Config = serde_json::from_str(&text).expect("parse");
        assert_eq!(config, back);
    }

    #[test]
    fn parse_secs_rejects_garbage() {
        let error = parse_secs("TABWISE_CALL_TIMEOUT_SECS", "soon").expect_err("reject");
        assert!(matches!(error, ConfigError::InvalidSeconds { .. }));
        assert!(error.to_string().contains("TABWISE_CALL_TIMEOUT_SECS"));
    }

    #[test]
    fn parse_secs_accepts_numbers() {
        assert_eq!(parse_secs("TABWISE_API_TIMEOUT_SECS", "12").expect("parse"), 12);
    }
}
