// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK configuration for talking to thallium-core.

use std::env;
use std::time::Duration;

use crate::error::{Result, SdkError};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080/rpc";

/// SDK configuration for talking to thallium-core.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    /// Session ID (required) - identifies this client's replies
    pub session_id: String,
    /// RPC endpoint (default: "http://127.0.0.1:8080/rpc")
    pub server_url: String,
    /// Poll interval in milliseconds (default: 1_000)
    pub poll_interval_ms: u64,
    /// Retries after a failed send (default: 3)
    pub max_retries: u32,
    /// Delay before the first retry, growing linearly (default: 200)
    pub retry_delay_ms: u64,
    /// Request timeout in milliseconds (default: 30_000)
    pub request_timeout_ms: u64,
}

impl SdkConfig {
    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `THALLIUM_SESSION_ID` - Session this client polls for
    ///
    /// # Optional Environment Variables
    /// - `THALLIUM_SERVER_URL` - RPC endpoint (default: "http://127.0.0.1:8080/rpc")
    /// - `THALLIUM_POLL_INTERVAL_MS` - Poll interval (default: 1000)
    /// - `THALLIUM_MAX_RETRIES` - Send retries (default: 3)
    /// - `THALLIUM_RETRY_DELAY_MS` - Base retry delay (default: 200)
    /// - `THALLIUM_REQUEST_TIMEOUT_MS` - Request timeout (default: 30000)
    pub fn from_env() -> Result<Self> {
        let session_id = env::var("THALLIUM_SESSION_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SdkError::Config("THALLIUM_SESSION_ID is required".to_string()))?;

        let server_url =
            env::var("THALLIUM_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let poll_interval_ms = parse_var("THALLIUM_POLL_INTERVAL_MS", 1_000)?;
        if poll_interval_ms == 0 {
            return Err(SdkError::Config(
                "THALLIUM_POLL_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            session_id,
            server_url,
            poll_interval_ms,
            max_retries: parse_var("THALLIUM_MAX_RETRIES", 3)?,
            retry_delay_ms: parse_var("THALLIUM_RETRY_DELAY_MS", 200)?,
            request_timeout_ms: parse_var("THALLIUM_REQUEST_TIMEOUT_MS", 30_000)?,
        })
    }

    /// Create a new configuration for the given session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval_ms: 1_000,
            max_retries: 3,
            retry_delay_ms: 200,
            request_timeout_ms: 30_000,
        }
    }

    /// Set the RPC endpoint.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Set how often a failed send is retried.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = delay_ms;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| SdkError::Config(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 6] = [
        "THALLIUM_SESSION_ID",
        "THALLIUM_SERVER_URL",
        "THALLIUM_POLL_INTERVAL_MS",
        "THALLIUM_MAX_RETRIES",
        "THALLIUM_RETRY_DELAY_MS",
        "THALLIUM_REQUEST_TIMEOUT_MS",
    ];

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in VARS {
                guard.remember(key);
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe { env::remove_var(key) };
            }
            guard
        }

        fn remember(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
        }

        fn set(&mut self, key: &str, value: &str) {
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_from_env_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();
        guard.set("THALLIUM_SESSION_ID", "session-a");

        let config = SdkConfig::from_env().unwrap();
        assert_eq!(config.session_id, "session-a");
        assert_eq!(config.server_url, "http://127.0.0.1:8080/rpc");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 200);
        assert_eq!(config.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_from_env_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();
        guard.set("THALLIUM_SESSION_ID", "session-b");
        guard.set("THALLIUM_SERVER_URL", "http://core:9000/rpc");
        guard.set("THALLIUM_POLL_INTERVAL_MS", "250");
        guard.set("THALLIUM_MAX_RETRIES", "0");

        let config = SdkConfig::from_env().unwrap();
        assert_eq!(config.server_url, "http://core:9000/rpc");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_from_env_requires_session() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let err = SdkConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("THALLIUM_SESSION_ID"));
    }

    #[test]
    fn test_from_env_invalid_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();
        guard.set("THALLIUM_SESSION_ID", "s");

        guard.set("THALLIUM_MAX_RETRIES", "lots");
        assert!(SdkConfig::from_env().is_err());

        guard.set("THALLIUM_MAX_RETRIES", "3");
        guard.set("THALLIUM_POLL_INTERVAL_MS", "0");
        assert!(SdkConfig::from_env().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = SdkConfig::new("s")
            .with_server_url("http://localhost:1/rpc")
            .with_poll_interval_ms(50)
            .with_max_retries(5)
            .with_retry_delay_ms(0)
            .with_request_timeout_ms(1_000);

        assert_eq!(config.server_url, "http://localhost:1/rpc");
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_ms, 0);
        assert_eq!(config.request_timeout_ms, 1_000);
    }
}
