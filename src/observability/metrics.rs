//! Metric sinks and the response capture layer.
//!
//! # Responsibilities
//! - Define the three primitives every backend offers (count, gauge, histogram)
//! - Forward to the `metrics` facade and expose it for Prometheus scrapes
//! - Time every HTTP call and emit one `http_router` histogram per response
//!
//! # Metrics
//! - `http_router` (histogram, ms): tags `via`, `url_path`, `url`, `resp_code`
//!
//! # Design Decisions
//! - Emission is spawned and never awaited by the response path
//! - Backend failures are logged at `warn` and go no further
//! - Tags are `key:value` strings, as DogStatsD expects

use axum::body::HttpBody;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use thiserror::Error;
use tower::{Layer, Service};

use crate::routing::dispatcher::RouteTag;

/// Histogram emitted for every HTTP response.
pub const HTTP_ROUTER_METRIC: &str = "http_router";

/// Route tag used when no route matched.
pub const UNKNOWN_ROUTE: &str = "UNKNOWN";

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric service name must not be empty")]
    EmptyServiceName,

    #[error("invalid metric name {0:?}")]
    InvalidName(String),

    #[error("metric endpoint {0:?} did not resolve")]
    Unresolved(String),

    #[error("metric transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("prometheus exporter: {0}")]
    Exporter(#[from] metrics_exporter_prometheus::BuildError),
}

/// A metrics backend.
///
/// Implementations must not block: they are called from request tasks.
pub trait MetricSink: Send + Sync + 'static {
    /// How many times something happened.
    fn count(&self, name: &str, value: i64, tags: &[String], rate: f64) -> Result<(), MetricError>;

    /// The value of something at this moment.
    fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), MetricError>;

    /// Milliseconds elapsed since `started`.
    fn histogram(&self, name: &str, started: Instant, tags: &[String]) -> Result<(), MetricError>;
}

pub type SharedSink = Arc<dyn MetricSink>;

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricSink for NoopSink {
    fn count(&self, _: &str, _: i64, _: &[String], _: f64) -> Result<(), MetricError> {
        Ok(())
    }

    fn gauge(&self, _: &str, _: f64, _: &[String], _: f64) -> Result<(), MetricError> {
        Ok(())
    }

    fn histogram(&self, _: &str, _: Instant, _: &[String]) -> Result<(), MetricError> {
        Ok(())
    }
}

/// Forwards to whatever recorder the `metrics` facade has installed.
///
/// `key:value` tags become labels; a bare tag becomes `tag="true"`. The
/// sample rate is ignored, the recorder aggregates locally.
#[derive(Debug, Clone)]
pub struct RecorderSink {
    namespace: String,
}

impl RecorderSink {
    pub fn new(service: &str) -> Result<Self, MetricError> {
        if service.trim().is_empty() {
            return Err(MetricError::EmptyServiceName);
        }
        Ok(Self {
            namespace: service.replace(['-', '.'], "_"),
        })
    }

    fn key(&self, name: &str) -> Result<String, MetricError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MetricError::InvalidName(name.to_string()));
        }
        Ok(format!("{}_{}", self.namespace, name))
    }
}

fn labels(tags: &[String]) -> Vec<metrics::Label> {
    tags.iter()
        .map(|tag| match tag.split_once(':') {
            Some((key, value)) => metrics::Label::new(key.to_string(), value.to_string()),
            None => metrics::Label::new(tag.clone(), "true"),
        })
        .collect()
}

impl MetricSink for RecorderSink {
    fn count(&self, name: &str, value: i64, tags: &[String], _rate: f64) -> Result<(), MetricError> {
        let key = self.key(name)?;
        // Counters are monotonic; negative deltas have no meaning here.
        metrics::counter!(key, labels(tags)).increment(value.max(0) as u64);
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String], _rate: f64) -> Result<(), MetricError> {
        let key = self.key(name)?;
        metrics::gauge!(key, labels(tags)).set(value);
        Ok(())
    }

    fn histogram(&self, name: &str, started: Instant, tags: &[String]) -> Result<(), MetricError> {
        let key = self.key(name)?;
        metrics::histogram!(key, labels(tags)).record(elapsed_ms(started));
        Ok(())
    }
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), MetricError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Tags attached to the `http_router` histogram.
pub fn capture_tags(route: &str, path: &str, status: u16) -> Vec<String> {
    vec![
        "via:http".to_string(),
        format!("url_path:{route}"),
        format!("url:{path}"),
        format!("resp_code:{status}"),
    ]
}

// =============================================================================
// CaptureMetricsLayer
// =============================================================================

/// Layer that times each call and reports it to a [`MetricSink`].
///
/// The route tag comes from the [`RouteTag`] the dispatcher attaches to the
/// response, so unmatched requests are reported as `UNKNOWN`.
#[derive(Clone)]
pub struct CaptureMetricsLayer {
    sink: SharedSink,
}

impl CaptureMetricsLayer {
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for CaptureMetricsLayer {
    type Service = CaptureMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureMetricsService {
            inner,
            sink: self.sink.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CaptureMetricsService<S> {
    inner: S,
    sink: SharedSink,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CaptureMetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: HttpBody + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let started = Instant::now();
        let path = request.uri().path().to_string();
        let sink = self.sink.clone();
        // Take the instance that was polled ready.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(request).await?;

            let route = response
                .extensions()
                .get::<RouteTag>()
                .map(|tag| tag.0.to_string())
                .unwrap_or_else(|| UNKNOWN_ROUTE.to_string());
            let status = response.status().as_u16();
            tracing::debug!(
                route = %route,
                path = %path,
                status,
                bytes = ?response.body().size_hint().exact(),
                duration_ms = elapsed_ms(started),
                "Captured response"
            );

            let tags = capture_tags(&route, &path, status);
            tokio::spawn(async move {
                if let Err(e) = sink.histogram(HTTP_ROUTER_METRIC, started, &tags) {
                    tracing::warn!(error = %e, metric = HTTP_ROUTER_METRIC, "Failed to emit metric");
                }
            });

            Ok(response)
        })
    }
}
