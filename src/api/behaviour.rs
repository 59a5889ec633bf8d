//! Query-controlled behaviour for the demo endpoints.
//!
//! `status_code` picks the outcome and `latency` adds a delay in seconds,
//! so callers can produce any mix of results and response times on demand.

use axum::extract::Query;
use axum::http::Uri;
use std::collections::HashMap;
use std::num::ParseIntError;
use std::time::Duration;
use thiserror::Error;

use crate::http::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviourError {
    #[error("invalid query string: {0}")]
    Query(String),

    #[error("invalid status_code {value:?}: {source}")]
    StatusCode {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid latency {value:?}: {source}")]
    Latency {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// What the caller asked the endpoint to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlledBehaviour {
    /// Error to answer with; `None` answers success.
    pub error: Option<DomainError>,
    /// Whole seconds to wait before answering. Zero or less means no wait.
    pub latency_secs: i64,
}

impl ControlledBehaviour {
    pub fn from_uri(uri: &Uri) -> Result<Self, BehaviourError> {
        let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri)
            .map_err(|e| BehaviourError::Query(e.body_text()))?;
        Self::from_params(&params)
    }

    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, BehaviourError> {
        let mut behaviour = Self::default();

        if let Some(raw) = params.get("status_code").filter(|v| !v.is_empty()) {
            let status: i64 = raw.parse().map_err(|source| BehaviourError::StatusCode {
                value: raw.clone(),
                source,
            })?;
            behaviour.error = match status {
                200 => None,
                400 => Some(DomainError::BadRequest),
                403 => Some(DomainError::ForbiddenResource),
                _ => Some(DomainError::InternalServerError),
            };
        }

        if let Some(raw) = params.get("latency").filter(|v| !v.is_empty()) {
            behaviour.latency_secs = raw.parse().map_err(|source| BehaviourError::Latency {
                value: raw.clone(),
                source,
            })?;
        }

        Ok(behaviour)
    }

    /// The requested delay, if any.
    pub fn latency(&self) -> Option<Duration> {
        u64::try_from(self.latency_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(uri: &str) -> Result<ControlledBehaviour, BehaviourError> {
        ControlledBehaviour::from_uri(&uri.parse().unwrap())
    }

    #[test]
    fn test_empty_query_is_success() {
        assert_eq!(parse("/accounts").unwrap(), ControlledBehaviour::default());
        assert_eq!(
            parse("/accounts?status_code=&latency=").unwrap(),
            ControlledBehaviour::default()
        );
    }

    #[test]
    fn test_status_codes_map_to_errors() {
        assert_eq!(parse("/a?status_code=200").unwrap().error, None);
        assert_eq!(
            parse("/a?status_code=400").unwrap().error,
            Some(DomainError::BadRequest)
        );
        assert_eq!(
            parse("/a?status_code=403").unwrap().error,
            Some(DomainError::ForbiddenResource)
        );
        assert_eq!(
            parse("/a?status_code=418").unwrap().error,
            Some(DomainError::InternalServerError)
        );
    }

    #[test]
    fn test_latency() {
        let behaviour = parse("/a?latency=3").unwrap();
        assert_eq!(behaviour.latency(), Some(Duration::from_secs(3)));
        assert_eq!(parse("/a?latency=-2").unwrap().latency(), None);
        assert_eq!(parse("/a?latency=0").unwrap().latency(), None);
    }

    #[test]
    fn test_unparsable_values() {
        assert!(matches!(
            parse("/a?status_code=abc"),
            Err(BehaviourError::StatusCode { .. })
        ));
        let err = parse("/a?latency=1.5").unwrap_err();
        assert!(err.to_string().starts_with("invalid latency \"1.5\""));
    }
}
