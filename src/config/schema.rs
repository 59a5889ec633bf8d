//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service identity and listener.
    pub server: ServerConfig,

    /// Route table settings.
    pub api: ApiConfig,

    /// DogStatsD agent.
    pub datadog: DatadogConfig,

    /// Logging and metrics backend.
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service name, used in metric namespaces.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "ddogsvc".to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// API route settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Prepended to every route path. Empty or `/name`.
    pub prefix: String,

    /// Per-request deadline.
    pub default_timeout_secs: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/ddogsvc".to_string(),
            default_timeout_secs: 2,
        }
    }
}

/// DogStatsD agent location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatadogConfig {
    /// Agent address (e.g., "127.0.0.1:8125").
    pub endpoint: String,
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:8125".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetricsBackend {
    #[default]
    Datadog,
    Prometheus,
    Disabled,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Where metrics go.
    pub metrics_backend: MetricsBackend,

    /// Prometheus scrape endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_backend: MetricsBackend::Datadog,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
