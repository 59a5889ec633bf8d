//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every HTTP call:
//!     → metrics.rs CaptureMetricsLayer (timing, route tag, status)
//!     → spawned emission → MetricSink
//!         → statsd.rs DatadogSink (UDP datagram)
//!         → metrics.rs RecorderSink (metrics facade, Prometheus scrape)
//!         → NoopSink
//!
//! All subsystems:
//!     → logging.rs (structured tracing events, pretty or JSON)
//! ```
//!
//! # Design Decisions
//! - Metrics never block or fail a response
//! - Request ID flows through every log line of a request
//! - Backend chosen once at startup from configuration

pub mod logging;
pub mod metrics;
pub mod statsd;

pub use metrics::{
    CaptureMetricsLayer, MetricError, MetricSink, NoopSink, RecorderSink, SharedSink,
};
pub use statsd::DatadogSink;
