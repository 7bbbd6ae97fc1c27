//! Application configuration settings
//!
//! All settings are environment-sourced with sensible defaults; a `.env`
//! file is honored when present. Per-vendor API keys (`OPENAI_API_KEY`,
//! `GROQ_API_KEY`, ...) are read lazily by the provider registry, not here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::middleware::rate_limit::RateLimitConfig;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub request: RequestConfig,
    pub logging: LoggingConfig,
    /// Whether fallback-chain members also get the retry wrapper.
    pub retry_with_fallback: bool,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Request handling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_bytes: usize,
    /// Absolute timeout for non-streaming requests, seconds.
    pub timeout_secs: u64,
    /// Idle timeout for streaming requests, seconds.
    pub idle_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Settings {
    /// Load configuration from the environment.
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok();

        let settings = Self {
            server: ServerConfig {
                host: get_env_or_default("SERVER_HOST", "0.0.0.0"),
                port: get_env_or_default("PORT", "8082")
                    .parse()
                    .context("Invalid port number")?,
            },
            rate_limit: RateLimitConfig {
                requests_per_second: get_env_or_default("RATE_LIMIT_REQUESTS_PER_SECOND", "10")
                    .parse()
                    .context("Invalid requests-per-second value")?,
                requests_per_minute: get_env_or_default("RATE_LIMIT_REQUESTS_PER_MINUTE", "0")
                    .parse()
                    .context("Invalid requests-per-minute value")?,
                requests_per_hour: get_env_or_default("RATE_LIMIT_REQUESTS_PER_HOUR", "0")
                    .parse()
                    .context("Invalid requests-per-hour value")?,
                requests_per_day: get_env_or_default("RATE_LIMIT_REQUESTS_PER_DAY", "0")
                    .parse()
                    .context("Invalid requests-per-day value")?,
                burst: get_env_or_default("RATE_LIMIT_BURST", "20")
                    .parse()
                    .context("Invalid burst value")?,
                max_clients: get_env_or_default("RATE_LIMIT_MAX_CLIENTS", "0")
                    .parse()
                    .context("Invalid max-clients value")?,
            },
            request: RequestConfig {
                max_body_bytes: get_env_or_default("MAX_REQUEST_SIZE", "10485760")
                    .parse()
                    .context("Invalid maximum request size")?,
                timeout_secs: get_env_or_default("REQUEST_TIMEOUT", "180")
                    .parse()
                    .context("Invalid request timeout")?,
                idle_timeout_secs: get_env_or_default("STREAM_IDLE_TIMEOUT", "180")
                    .parse()
                    .context("Invalid stream idle timeout")?,
            },
            logging: LoggingConfig {
                level: get_env_or_default("RUST_LOG", "info"),
                format: get_env_or_default("LOG_FORMAT", "text"),
            },
            retry_with_fallback: {
                let value = get_env_or_default("RETRY_WITH_FALLBACK", "false");
                value == "true" || value == "1"
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration validity.
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Port number cannot be 0");
        }

        if self.rate_limit.requests_per_second <= 0.0 {
            anyhow::bail!("Requests per second must be positive");
        }

        if self.rate_limit.burst == 0 {
            anyhow::bail!("Burst cannot be 0");
        }

        if self.request.max_body_bytes == 0 {
            anyhow::bail!("Maximum request size cannot be 0");
        }

        if self.request.timeout_secs == 0 || self.request.idle_timeout_secs == 0 {
            anyhow::bail!("Timeout values cannot be 0");
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8082,
            },
            rate_limit: RateLimitConfig::default(),
            request: RequestConfig {
                max_body_bytes: 10 * 1024 * 1024,
                timeout_secs: 180,
                idle_timeout_secs: 180,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
            retry_with_fallback: false,
        }
    }
}

/// Get environment variable or default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 8082);
        assert_eq!(settings.rate_limit.requests_per_second, 10.0);
        assert_eq!(settings.rate_limit.burst, 20);
        assert_eq!(settings.rate_limit.requests_per_minute, 0);
        assert_eq!(settings.request.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.request.timeout_secs, 180);
        assert!(!settings.retry_with_fallback);
    }

    #[test]
    fn test_validation_rejects_zero_burst() {
        let mut settings = Settings::default();
        settings.rate_limit.burst = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_format() {
        let mut settings = Settings::default();
        settings.logging.format = "xml".to_string();
        assert!(settings.validate().is_err());
    }
}
