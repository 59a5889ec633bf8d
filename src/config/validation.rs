//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeout within 1s..=1 day, addresses parse)
//! - Check settings required by the chosen metrics backend
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{MetricsBackend, ServiceConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Longest accepted route timeout: one day.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name must not be empty")]
    EmptyServiceName,

    #[error("server.bind_address {0:?} is not a socket address")]
    BadBindAddress(String),

    #[error("api.default_timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("api.default_timeout_secs {0} exceeds the maximum of {MAX_TIMEOUT_SECS}")]
    TimeoutTooLarge(u64),

    #[error("api.prefix {0:?} must be empty or start with '/' and not end with it")]
    BadPrefix(String),

    #[error("datadog.endpoint must be set when metrics_backend is datadog")]
    MissingDatadogEndpoint,

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    BadMetricsAddress(String),
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }
    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadBindAddress(
            config.server.bind_address.clone(),
        ));
    }

    match config.api.default_timeout_secs {
        0 => errors.push(ValidationError::ZeroTimeout),
        secs if secs > MAX_TIMEOUT_SECS => errors.push(ValidationError::TimeoutTooLarge(secs)),
        _ => {}
    }
    let prefix = &config.api.prefix;
    if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
        errors.push(ValidationError::BadPrefix(prefix.clone()));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            observability.log_level.clone(),
        ));
    }
    match observability.metrics_backend {
        MetricsBackend::Datadog if config.datadog.endpoint.trim().is_empty() => {
            errors.push(ValidationError::MissingDatadogEndpoint);
        }
        MetricsBackend::Prometheus
            if observability.metrics_address.parse::<SocketAddr>().is_err() =>
        {
            errors.push(ValidationError::BadMetricsAddress(
                observability.metrics_address.clone(),
            ));
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
