//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use saga::SessionConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `GATEWAY_URL`: payment gateway base URL (default: `"http://localhost:8081"`)
/// - `ORDER_BACKEND_URL`: order backend base URL (default: `"http://localhost:8082"`)
/// - `DRAFT_PATH`: pending draft file (default: `"pending_draft.json"`)
/// - `POLL_INTERVAL_SECS`: seconds between status queries (default: `3`)
/// - `PAYMENT_TIMEOUT_SECS`: bound on waiting for payment (default: `600`)
/// - `QUERY_TIMEOUT_SECS`: bound on a single gateway or backend call (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub gateway_url: String,
    pub order_backend_url: String,
    pub draft_path: PathBuf,
    pub poll_interval_secs: u64,
    pub payment_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Unparseable numeric values fall back to their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_or("HOST", defaults.host),
            port: env_or("PORT", defaults.port),
            log_level: env_or("RUST_LOG", defaults.log_level),
            gateway_url: env_or("GATEWAY_URL", defaults.gateway_url),
            order_backend_url: env_or("ORDER_BACKEND_URL", defaults.order_backend_url),
            draft_path: env_or("DRAFT_PATH", defaults.draft_path),
            poll_interval_secs: env_or("POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            payment_timeout_secs: env_or("PAYMENT_TIMEOUT_SECS", defaults.payment_timeout_secs),
            query_timeout_secs: env_or("QUERY_TIMEOUT_SECS", defaults.query_timeout_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timing for payment sessions and the reconciler.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            payment_timeout: Duration::from_secs(self.payment_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs.max(1)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            gateway_url: "http://localhost:8081".to_string(),
            order_backend_url: "http://localhost:8082".to_string(),
            draft_path: PathBuf::from("pending_draft.json"),
            poll_interval_secs: 3,
            payment_timeout_secs: 600,
            query_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.draft_path, PathBuf::from("pending_draft.json"));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_session_config_matches_defaults() {
        assert_eq!(Config::default().session_config(), SessionConfig::default());
    }

    #[test]
    fn test_session_config_never_polls_continuously() {
        let config = Config {
            poll_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.session_config().poll_interval, Duration::from_secs(1));
    }
}
