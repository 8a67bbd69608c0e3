//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use settlehook_core::{
    delivery::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT},
    BackoffPolicy, DeliveryConfig, DEFAULT_FAILURE_THRESHOLD,
};
use std::time::Duration;

/// Service configuration
///
/// Every field has a default, so an empty configuration source is valid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Outbound webhook delivery settings
    pub delivery: DeliverySettings,

    /// Subscription health settings
    pub health: HealthSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than zero"));
        }
        if self.server.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be greater than zero"));
        }
        if self.delivery.max_attempts == 0 {
            return Err(invalid("delivery.max_attempts must be at least 1"));
        }
        if self.delivery.request_timeout_seconds == 0 {
            return Err(invalid("delivery.request_timeout_seconds must be greater than zero"));
        }
        let multiplier = self.delivery.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(invalid("delivery.backoff_multiplier must be at least 1.0"));
        }
        if self.delivery.max_backoff_ms < self.delivery.base_backoff_ms {
            return Err(invalid(
                "delivery.max_backoff_ms must not be below delivery.base_backoff_ms",
            ));
        }
        if self.delivery.user_agent.trim().is_empty() {
            return Err(invalid("delivery.user_agent must not be empty"));
        }
        if HeaderValue::from_str(&self.delivery.user_agent).is_err() {
            return Err(invalid(
                "delivery.user_agent must be a valid HTTP header value",
            ));
        }
        if self.health.failure_threshold == 0 {
            return Err(invalid("health.failure_threshold must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: false,
            enable_compression: true,
        }
    }
}

/// Outbound delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Total attempts per notification and subscriber
    pub max_attempts: u32,

    /// Wait after the first failed attempt
    pub base_backoff_ms: u64,

    /// Cap on any single wait
    pub max_backoff_ms: u64,

    pub backoff_multiplier: f64,

    /// Per-attempt HTTP timeout
    pub request_timeout_seconds: u64,

    pub user_agent: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            max_attempts: backoff.max_attempts,
            base_backoff_ms: backoff.initial_delay.as_millis() as u64,
            max_backoff_ms: backoff.max_delay.as_millis() as u64,
            backoff_multiplier: backoff.backoff_multiplier,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl DeliverySettings {
    /// Build the engine configuration from these settings
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            backoff: BackoffPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.base_backoff_ms),
            )
            .with_max_delay(Duration::from_millis(self.max_backoff_ms))
            .with_multiplier(self.backoff_multiplier),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Subscription health configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Consecutive exhausted notifications before a subscription is disabled
    pub failure_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
