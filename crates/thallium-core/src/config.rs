// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Default expiry timeout for both messages and jobs.
pub const DEFAULT_EXPIRY_TIMEOUT: Duration = Duration::from_secs(300);

/// Largest accepted expiry timeout or sweep interval, in seconds (ten years).
pub const MAX_TIMEOUT_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Thallium Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// HTTP RPC server address
    pub http_addr: SocketAddr,
    /// Expiry timeouts applied when a request context is opened
    pub timeouts: ExpiryTimeouts,
    /// Period of the background expiry sweep, `None` when disabled
    pub sweep_interval: Option<Duration>,
}

/// Age after which undelivered messages and unfinished jobs are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryTimeouts {
    pub message: Duration,
    pub job: Duration,
}

impl Default for ExpiryTimeouts {
    fn default() -> Self {
        Self {
            message: DEFAULT_EXPIRY_TIMEOUT,
            job: DEFAULT_EXPIRY_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `THALLIUM_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `THALLIUM_HTTP_PORT`: RPC server port (default: 8080)
    /// - `THALLIUM_MESSAGE_TIMEOUT_SECS`: message expiry (default: 300)
    /// - `THALLIUM_JOB_TIMEOUT_SECS`: job expiry (default: 300)
    /// - `THALLIUM_SWEEP_INTERVAL_SECS`: background sweep period, 0 disables it (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("THALLIUM_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("THALLIUM_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("THALLIUM_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("THALLIUM_HTTP_PORT", "must be a valid port number")
            })?;

        let message_timeout = secs_from_env("THALLIUM_MESSAGE_TIMEOUT_SECS", 300)?;
        let job_timeout = secs_from_env("THALLIUM_JOB_TIMEOUT_SECS", 300)?;
        let sweep_interval = secs_from_env("THALLIUM_SWEEP_INTERVAL_SECS", 0)?;

        Ok(Self {
            database_url,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            timeouts: ExpiryTimeouts {
                message: Duration::from_secs(message_timeout),
                job: Duration::from_secs(job_timeout),
            },
            sweep_interval: (sweep_interval > 0).then(|| Duration::from_secs(sweep_interval)),
        })
    }
}

fn secs_from_env(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| {
                ConfigError::Invalid(key, "must be a non-negative number of seconds")
            })?;
            if secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::Invalid(key, "must not exceed ten years"));
            }
            Ok(secs)
        }
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
