//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// One full-length match at 60 Hz
pub const DEFAULT_MAX_REPLAY_TICKS: u64 = 90 * 60 * 60;

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,

    /// Match length used when a create request names none
    pub default_duration_ticks: Option<u64>,
    /// Overrides the mode preset's input lookahead
    pub input_lookahead: Option<u64>,
    /// Max WebSocket messages per connection per second
    pub input_rate_limit: u32,
    /// Longest replay a verification request may ask for
    pub max_replay_ticks: u64,

    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // PORT wins over SERVER_ADDR when both are set
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
        };

        let max_replay_ticks =
            parse_opt(&lookup, "MAX_REPLAY_TICKS")?.unwrap_or(DEFAULT_MAX_REPLAY_TICKS);
        if max_replay_ticks == 0 {
            return Err(ConfigError::Invalid("MAX_REPLAY_TICKS"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            default_duration_ticks: parse_opt(&lookup, "DEFAULT_DURATION_TICKS")?,
            input_lookahead: parse_opt(&lookup, "INPUT_LOOKAHEAD")?,
            input_rate_limit: parse_opt(&lookup, "INPUT_RATE_LIMIT")?.unwrap_or(INPUT_RATE_LIMIT),
            max_replay_ticks,
            client_origin: lookup("CLIENT_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        })
    }
}

fn parse_opt<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .map(|raw| raw.trim().parse().map_err(|_| ConfigError::Invalid(key)))
        .transpose()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
