//! Application configuration with layered loading.
//!
//! Configuration is loaded with figment from multiple sources:
//!
//! 1. Environment variables (FETCHONCE_*)
//! 2. TOML config file (if FETCHONCE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::resolver::ResolverOptions;

mod validation;

pub use validation::ConfigError;

/// Environment variable naming the optional TOML config file.
pub const CONFIG_FILE_ENV: &str = "FETCHONCE_CONFIG_FILE";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FETCHONCE_*)
/// 2. TOML config file (if FETCHONCE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite blob store.
    ///
    /// Set via FETCHONCE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via FETCHONCE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via FETCHONCE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum payload size accepted from the network.
    ///
    /// Set via FETCHONCE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum number of redirects to follow.
    ///
    /// Set via FETCHONCE_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Upper bound on simultaneous network fetches across all keys.
    ///
    /// Set via FETCHONCE_MAX_CONCURRENT_FETCHES environment variable.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Treat a failed store write after a successful fetch as a resolve failure.
    ///
    /// Set via FETCHONCE_STRICT_WRITES environment variable.
    #[serde(default)]
    pub strict_writes: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./fetchonce-cache.sqlite")
}

fn default_user_agent() -> String {
    "fetchonce/0.1".into()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_bytes() -> usize {
    52_428_800 // 50MB
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_concurrent_fetches() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            max_redirects: default_max_redirects(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            strict_writes: false,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolver tuning derived from this configuration.
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions { max_concurrent_fetches: self.max_concurrent_fetches, strict_writes: self.strict_writes }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed, or
    /// if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::var(CONFIG_FILE_ENV).ok())
    }

    /// Same as [`AppConfig::load`], with an explicit TOML file taking the
    /// place of `FETCHONCE_CONFIG_FILE`.
    pub fn load_from(config_file: Option<String>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_path) = config_file {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FETCHONCE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./fetchonce-cache.sqlite"));
        assert_eq!(config.user_agent, "fetchonce/0.1");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_bytes, 52_428_800);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.max_concurrent_fetches, 8);
        assert!(!config.strict_writes);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_resolver_options() {
        let config = AppConfig { max_concurrent_fetches: 3, strict_writes: true, ..Default::default() };
        let opts = config.resolver_options();
        assert_eq!(opts.max_concurrent_fetches, 3);
        assert!(opts.strict_writes);
    }

    #[test]
    fn test_load_layers() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("fetchonce.toml", "user_agent = \"from-file\"\nmax_concurrent_fetches = 2")?;
            jail.set_env("FETCHONCE_MAX_CONCURRENT_FETCHES", "4");

            let config = AppConfig::load_from(Some("fetchonce.toml".into())).expect("config loads");
            assert_eq!(config.user_agent, "from-file");
            assert_eq!(config.max_concurrent_fetches, 4);
            assert_eq!(config.timeout_ms, 30_000);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("FETCHONCE_MAX_CONCURRENT_FETCHES", "0");
            let result = AppConfig::load_from(None);
            assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_concurrent_fetches"));
            Ok(())
        });
    }
}
