//! Configuration validation rules.
//!
//! Checks `AppConfig` values after they have been loaded from environment,
//! files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

const MAX_PAYLOAD_BYTES: usize = 1024 * 1024 * 1024;
const MAX_TIMEOUT_MS: u64 = 600_000;
const MAX_WORKERS: usize = 256;
const MAX_REDIRECTS: usize = 20;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 1GiB
    /// - `timeout_ms` is less than 100ms or exceeds 10 minutes
    /// - `user_agent` is empty
    /// - `max_concurrent_fetches` is 0 or exceeds 256
    /// - `max_redirects` exceeds 20
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > MAX_PAYLOAD_BYTES {
            return Err(invalid("max_bytes", "must not exceed 1GiB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(invalid("timeout_ms", "must not exceed 10 minutes (600000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.max_concurrent_fetches == 0 {
            return Err(invalid("max_concurrent_fetches", "must be greater than 0"));
        }
        if self.max_concurrent_fetches > MAX_WORKERS {
            return Err(invalid("max_concurrent_fetches", "must not exceed 256"));
        }

        if self.max_redirects > MAX_REDIRECTS {
            return Err(invalid("max_redirects", "must not exceed 20"));
        }

        if self.strict_writes {
            tracing::debug!("strict_writes enabled; store write failures fail the resolve");
        }

        Ok(())
    }
}
