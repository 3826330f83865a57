// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::errors::ConfigError;
use crate::record::{EnvironmentContext, LogLevel};
use crate::retry::RetryStrategy;

pub const DEFAULT_TABLE_NAME: &str = "WADLogsTable";
pub const DEFAULT_FLUSH_INTERVAL_MINUTES: u64 = 5;
pub const DEFAULT_MARKER_INTERVAL_MINUTES: u64 = 30;
pub const DEFAULT_LAYOUT: &str = "{message}";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const MIN_INTERVAL_MINUTES: u64 = 1;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the table endpoint
    pub storage_url: String,
    /// Credential sent with every request
    pub storage_key: Option<String>,
    pub table_name: String,
    /// how often to flush, in minutes
    pub flush_interval_minutes: u64,
    /// how often to emit a liveness marker, in minutes
    pub marker_interval_minutes: u64,
    pub min_level: LogLevel,
    pub layout: String,
    /// timeout for each request to the table endpoint, in seconds
    pub request_timeout_secs: u64,
    pub proxy_url: Option<String>,
    pub retry_strategy: RetryStrategy,
    pub environment: EnvironmentContext,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_url: String::new(),
            storage_key: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            flush_interval_minutes: DEFAULT_FLUSH_INTERVAL_MINUTES,
            marker_interval_minutes: DEFAULT_MARKER_INTERVAL_MINUTES,
            min_level: LogLevel::Information,
            layout: DEFAULT_LAYOUT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            proxy_url: None,
            retry_strategy: RetryStrategy::default(),
            environment: EnvironmentContext::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let storage_url = env::var("TABLE_STORAGE_URL")
            .map_err(|_| ConfigError::MissingVariable("TABLE_STORAGE_URL"))?;
        if !storage_url.starts_with("http://") && !storage_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                name: "TABLE_STORAGE_URL",
                value: storage_url,
            });
        }

        let min_level = match env::var("TABLE_MIN_LEVEL") {
            Ok(value) => value.parse::<LogLevel>().unwrap_or_else(|e| {
                warn!("TABLE | {e} in TABLE_MIN_LEVEL, using INFO");
                LogLevel::Information
            }),
            Err(_) => LogLevel::Information,
        };

        Ok(Config {
            storage_url,
            storage_key: env::var("TABLE_STORAGE_KEY").ok(),
            table_name: env::var("TABLE_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            flush_interval_minutes: parse_u64("TABLE_FLUSH_INTERVAL_MINUTES")
                .unwrap_or(DEFAULT_FLUSH_INTERVAL_MINUTES),
            marker_interval_minutes: parse_u64("TABLE_MARKER_INTERVAL_MINUTES")
                .unwrap_or(DEFAULT_MARKER_INTERVAL_MINUTES),
            min_level,
            layout: env::var("TABLE_LAYOUT").unwrap_or_else(|_| DEFAULT_LAYOUT.to_string()),
            request_timeout_secs: parse_u64("TABLE_REQUEST_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            proxy_url: env::var("TABLE_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            retry_strategy: RetryStrategy::default(),
            environment: EnvironmentContext {
                deployment_id: env::var("TABLE_DEPLOYMENT_ID").unwrap_or_default(),
                role: env::var("TABLE_ROLE").unwrap_or_default(),
                role_instance: env::var("TABLE_ROLE_INSTANCE").unwrap_or_default(),
            },
        })
    }
}

fn parse_u64(name: &str) -> Option<u64> {
    let value = env::var(name).ok()?;
    match value.trim().parse::<u64>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("TABLE | Ignoring {name}={value}: not a whole number");
            None
        }
    }
}

/// Flush and marker periods after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub flush: Duration,
    pub marker: Duration,
}

impl Intervals {
    /// Clamps both intervals to at least one minute. Silent, see [`Intervals::warn_clamped`].
    #[must_use]
    pub fn validate(config: &Config) -> Self {
        Intervals {
            flush: minutes(config.flush_interval_minutes.max(MIN_INTERVAL_MINUTES)),
            marker: minutes(config.marker_interval_minutes.max(MIN_INTERVAL_MINUTES)),
        }
    }

    /// Warns once for every interval in `config` that [`Intervals::validate`] clamps.
    pub fn warn_clamped(config: &Config) {
        for (name, value) in [
            ("flush interval", config.flush_interval_minutes),
            ("marker interval", config.marker_interval_minutes),
        ] {
            if value < MIN_INTERVAL_MINUTES {
                warn!(
                    "TABLE | Configured {name} of {value} minutes is below the minimum, using {MIN_INTERVAL_MINUTES}"
                );
            }
        }
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}
