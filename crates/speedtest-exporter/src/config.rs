// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::selector::ServerPreference;

pub const DEFAULT_LISTEN_PORT: u16 = 7777;
pub const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 3600;

/// Minimum level of log records the binary emits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Case-insensitive; unknown values fall back to info.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Level as a `tracing_subscriber` filter directive
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Exporter configuration, read once at startup
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// HTTP listen port
    pub listen_port: u16,
    /// Endpoint to measure against
    pub server: ServerPreference,
    /// Measure against the closest endpoint when the configured one is missing
    pub server_fallback: bool,
    /// Seconds between refresh cycles; must be positive
    pub refresh_interval_secs: i64,
    pub log_level: LogLevel,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_LISTEN_PORT,
            server: ServerPreference::Closest,
            server_fallback: false,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            log_level: LogLevel::Info,
        }
    }
}

impl ExporterConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_port = match non_empty_var("LISTEN_PORT") {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port))?,
            None => DEFAULT_LISTEN_PORT,
        };
        let server = non_empty_var("SERVER_ID")
            .map(|id| parse_server_preference(&id))
            .unwrap_or_default();
        let server_fallback = non_empty_var("SERVER_FALLBACK")
            .and_then(|val| parse_bool(&val))
            .unwrap_or(false);
        let refresh_interval_secs = non_empty_var("REFRESH_INTERVAL")
            .and_then(|val| val.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);
        let log_level = non_empty_var("LOG_LEVEL")
            .map(|val| LogLevel::parse(&val))
            .unwrap_or_default();

        let config = Self {
            listen_port,
            server,
            server_fallback,
            refresh_interval_secs,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs <= 0 {
            return Err(ConfigError::NonPositiveInterval(self.refresh_interval_secs));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(0).unsigned_abs())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|val| !val.is_empty())
}

/// `-1` and `closest` select the closest endpoint; any other integer is an endpoint id.
/// Anything else falls back to the closest endpoint.
fn parse_server_preference(value: &str) -> ServerPreference {
    let value = value.trim();
    if value.eq_ignore_ascii_case("closest") {
        return ServerPreference::Closest;
    }
    match value.parse::<i64>() {
        Ok(-1) | Err(_) => ServerPreference::Closest,
        Ok(id) => ServerPreference::Id(id.to_string()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
