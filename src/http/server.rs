//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router from the route table
//! - Wire up middleware (request ID, tracing, metric capture)
//! - Bind server to listener
//! - Drain in-flight requests on shutdown

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown;
use crate::observability::metrics::{CaptureMetricsLayer, SharedSink};
use crate::routing::RouteTable;

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server serving `table`, reporting to `sink`.
    pub fn new(config: ServiceConfig, table: RouteTable, sink: SharedSink) -> Self {
        let router = Self::build_router(table, sink);
        Self { router, config }
    }

    /// Build the axum router with all middleware layers.
    ///
    /// Outermost first: request ID, trace span, response request ID, metric
    /// capture, then the dispatcher-backed routes.
    fn build_router(table: RouteTable, sink: SharedSink) -> Router {
        table
            .into_router()
            .layer(CaptureMetricsLayer::new(sink))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            service = %self.config.server.name,
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::Envelope;
    use crate::http::sink::ResponseWriter;
    use crate::observability::metrics::NoopSink;
    use crate::routing::{RequestContext, RouteOptions};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut table = RouteTable::new(RouteOptions {
            prefix: "/svc".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        table
            .get(
                "/echo-id",
                |_w: ResponseWriter, _r: Request<Body>, ctx: RequestContext| async move {
                    Some(Envelope::new().set_data(ctx.request_id().map(str::to_string)))
                },
            )
            .unwrap();
        HttpServer::new(ServiceConfig::default(), table, Arc::new(NoopSink))
    }

    #[tokio::test]
    async fn test_request_id_generated_and_propagated() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .uri("/svc/echo-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let header = response
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(uuid::Uuid::parse_str(&header).is_ok());

        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"], header);
    }

    #[tokio::test]
    async fn test_client_request_id_is_kept() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .uri("/svc/echo-id")
                    .header("x-request-id", "client-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "client-7");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let coordinator = crate::lifecycle::Shutdown::new();
        let handle = tokio::spawn(server().run(listener, coordinator.subscribe()));

        coordinator.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
