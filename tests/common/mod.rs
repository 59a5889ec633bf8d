//! Shared utilities for integration tests.

use ddogsvc::config::{MetricsBackend, ServiceConfig};
use ddogsvc::lifecycle::{bootstrap, Shutdown};
use ddogsvc::observability::{MetricError, MetricSink};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A metric emitted through [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Recorded {
    Count { name: String, value: i64, tags: Vec<String> },
    Gauge { name: String, value: f64, tags: Vec<String> },
    Histogram { name: String, tags: Vec<String> },
}

/// Sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingSink {
    recorded: Mutex<Vec<Recorded>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn snapshot(&self) -> Vec<Recorded> {
        self.recorded.lock().clone()
    }

    /// Poll until `count` metrics have arrived or a second has passed.
    pub async fn wait_for(&self, count: usize) -> Vec<Recorded> {
        for _ in 0..100 {
            if self.recorded.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.snapshot()
    }
}

impl MetricSink for RecordingSink {
    fn count(&self, name: &str, value: i64, tags: &[String], _rate: f64) -> Result<(), MetricError> {
        self.recorded.lock().push(Recorded::Count {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        });
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String], _rate: f64) -> Result<(), MetricError> {
        self.recorded.lock().push(Recorded::Gauge {
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        });
        Ok(())
    }

    fn histogram(&self, name: &str, _started: Instant, tags: &[String]) -> Result<(), MetricError> {
        self.recorded.lock().push(Recorded::Histogram {
            name: name.to_string(),
            tags: tags.to_vec(),
        });
        Ok(())
    }
}

/// A running service on a loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub metrics: Arc<RecordingSink>,
    shutdown: Shutdown,
    handle: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(10), self.handle).await;
    }
}

/// Config for tests: ephemeral port, metrics recorded in-process.
pub fn test_config(timeout_secs: u64) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.api.default_timeout_secs = timeout_secs;
    config.observability.metrics_backend = MetricsBackend::Disabled;
    config
}

/// Start the service with the real route table and a recording sink.
pub async fn start_server(config: ServiceConfig) -> TestServer {
    let metrics = Arc::new(RecordingSink::default());
    let service = bootstrap(config, metrics.clone()).await.unwrap();
    let addr = service.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(service.serve(rx));

    TestServer {
        addr,
        metrics,
        shutdown,
        handle,
    }
}

/// HTTP client that never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
