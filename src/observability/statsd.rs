//! DogStatsD client.
//!
//! # Responsibilities
//! - Format count, gauge and histogram lines in the DogStatsD dialect
//! - Prefix every metric with `enterprise_<service>.`
//! - Attach `env` and `host` tags to every line
//!
//! # Design Decisions
//! - One datagram per metric, no shared buffer between callers
//! - `try_send` on a connected socket: never blocks a request task
//! - Sampling happens client side; dropped samples are not an error

use rand::Rng;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::UdpSocket;

use crate::config::env::Environment;
use crate::observability::metrics::{elapsed_ms, MetricError, MetricSink};

/// Host tag value when the hostname cannot be determined.
pub const UNDEFINED_HOST: &str = "undefined";

#[derive(Debug)]
pub struct DatadogSink {
    socket: UdpSocket,
    namespace: String,
    global_tags: Vec<String>,
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| UNDEFINED_HOST.to_string())
}

impl DatadogSink {
    /// Connect to the agent at `endpoint` (`host:port`).
    pub async fn connect(
        endpoint: &str,
        service: &str,
        env: Environment,
    ) -> Result<Self, MetricError> {
        if service.trim().is_empty() {
            return Err(MetricError::EmptyServiceName);
        }

        let agent = tokio::net::lookup_host(endpoint)
            .await?
            .next()
            .ok_or_else(|| MetricError::Unresolved(endpoint.to_string()))?;
        let local: SocketAddr = if agent.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(agent).await?;

        tracing::info!(agent = %agent, service, env = %env, "Datadog initialized");

        Ok(Self {
            socket,
            namespace: format!("enterprise_{service}."),
            global_tags: vec![format!("env:{env}"), format!("host:{}", hostname())],
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn global_tags(&self) -> &[String] {
        &self.global_tags
    }

    /// Render one DogStatsD line.
    fn line(
        &self,
        name: &str,
        value: &str,
        kind: &str,
        rate: f64,
        tags: &[String],
    ) -> Result<String, MetricError> {
        if name.is_empty() || name.contains([':', '|', '@', '#', '\n']) {
            return Err(MetricError::InvalidName(name.to_string()));
        }

        let mut line = format!("{}{}:{}|{}", self.namespace, name, value, kind);
        if rate < 1.0 {
            let _ = write!(line, "|@{rate}");
        }

        let mut all_tags = self.global_tags.iter().chain(tags.iter()).peekable();
        if all_tags.peek().is_some() {
            line.push_str("|#");
            for (i, tag) in all_tags.enumerate() {
                if i > 0 {
                    line.push(',');
                }
                line.push_str(tag);
            }
        }
        Ok(line)
    }

    fn send(&self, line: &str) -> Result<(), MetricError> {
        self.socket.try_send(line.as_bytes())?;
        Ok(())
    }
}

/// Whether a sample at `rate` should go out.
fn sampled(rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate.is_nan() || rate <= 0.0 {
        return false;
    }
    rand::thread_rng().gen_bool(rate)
}

impl MetricSink for DatadogSink {
    fn count(&self, name: &str, value: i64, tags: &[String], rate: f64) -> Result<(), MetricError> {
        let line = self.line(name, &value.to_string(), "c", rate, tags)?;
        if sampled(rate) {
            self.send(&line)?;
        }
        Ok(())
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String], rate: f64) -> Result<(), MetricError> {
        let line = self.line(name, &value.to_string(), "g", rate, tags)?;
        if sampled(rate) {
            self.send(&line)?;
        }
        Ok(())
    }

    fn histogram(&self, name: &str, started: Instant, tags: &[String]) -> Result<(), MetricError> {
        let line = self.line(name, &elapsed_ms(started).to_string(), "h", 1.0, tags)?;
        self.send(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn agent() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    async fn recv_line(agent: &UdpSocket) -> String {
        let mut buf = [0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(2), agent.recv(&mut buf))
            .await
            .expect("no datagram received")
            .unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_count_line_format() {
        let (agent, addr) = agent().await;
        let sink = DatadogSink::connect(&addr, "ddogsvc", Environment::Staging)
            .await
            .unwrap();

        sink.count("hits", 3, &["route:/a".to_string()], 1.0).unwrap();

        let line = recv_line(&agent).await;
        let host = sink.global_tags()[1].clone();
        assert_eq!(
            line,
            format!("enterprise_ddogsvc.hits:3|c|#env:staging,{host},route:/a")
        );
    }

    #[tokio::test]
    async fn test_gauge_and_histogram_kinds() {
        let (agent, addr) = agent().await;
        let sink = DatadogSink::connect(&addr, "ddogsvc", Environment::Development)
            .await
            .unwrap();

        sink.gauge("queue_depth", 1.5, &[], 1.0).unwrap();
        let line = recv_line(&agent).await;
        assert!(line.starts_with("enterprise_ddogsvc.queue_depth:1.5|g|#env:development,host:"));

        sink.histogram("http_router", Instant::now(), &[]).unwrap();
        let line = recv_line(&agent).await;
        assert!(line.starts_with("enterprise_ddogsvc.http_router:"));
        assert!(line.contains("|h|#env:development"));
    }

    #[tokio::test]
    async fn test_rate_is_rendered_when_sampled() {
        let (_agent, addr) = agent().await;
        let sink = DatadogSink::connect(&addr, "ddogsvc", Environment::Development)
            .await
            .unwrap();
        let line = sink.line("hits", "1", "c", 0.25, &[]).unwrap();
        assert!(line.starts_with("enterprise_ddogsvc.hits:1|c|@0.25|#"));
    }

    #[tokio::test]
    async fn test_zero_rate_sends_nothing() {
        let (agent, addr) = agent().await;
        let sink = DatadogSink::connect(&addr, "ddogsvc", Environment::Development)
            .await
            .unwrap();

        sink.count("dropped", 1, &[], 0.0).unwrap();
        sink.count("kept", 1, &[], 1.0).unwrap();

        let line = recv_line(&agent).await;
        assert!(line.starts_with("enterprise_ddogsvc.kept:1|c"));
    }

    #[tokio::test]
    async fn test_invalid_names_and_service() {
        let (_agent, addr) = agent().await;
        assert!(matches!(
            DatadogSink::connect(&addr, "", Environment::Development).await,
            Err(MetricError::EmptyServiceName)
        ));

        let sink = DatadogSink::connect(&addr, "ddogsvc", Environment::Development)
            .await
            .unwrap();
        assert!(matches!(
            sink.count("bad|name", 1, &[], 1.0),
            Err(MetricError::InvalidName(_))
        ));
    }

    #[test]
    fn test_sampling_bounds() {
        assert!(sampled(1.0));
        assert!(sampled(2.0));
        assert!(!sampled(0.0));
        assert!(!sampled(-1.0));
        assert!(!sampled(f64::NAN));
    }
}
