//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize subsystems in dependency order
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The response code table is checked before anything else
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::util::TryInitError;

use crate::config::{self, ConfigError, Environment, MetricsBackend, ServiceConfig};
use crate::http::error::{validate_code_table, MalformedCode};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::logging::init_logging;
use crate::observability::metrics::{
    install_prometheus, MetricError, NoopSink, RecorderSink, SharedSink,
};
use crate::observability::statsd::DatadogSink;
use crate::routing::{RouteError, RouteOptions, RouteTable};

/// Config module name; files are `main.<env>.toml`.
pub const CONFIG_MODULE: &str = "main";

/// Directory name the config lookup walks up to.
pub const SERVICE_DIR: &str = "ddogsvc";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("response code table: {0}")]
    CodeTable(#[from] MalformedCode),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("logging already initialised: {0}")]
    Logging(#[from] TryInitError),

    #[error("metrics: {0}")]
    Metrics(#[from] MetricError),

    #[error("routes: {0}")]
    Routes(#[from] RouteError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A bound, ready-to-serve service.
pub struct Service {
    server: HttpServer,
    listener: TcpListener,
}

impl Service {
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    pub fn server(&self) -> &HttpServer {
        &self.server
    }

    /// Serve until `shutdown` fires.
    pub async fn serve(self, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        self.server.run(self.listener, shutdown).await
    }
}

/// Load the config from `path`, or resolve `main.<env>.toml` from the
/// working directory.
pub fn load(path: Option<PathBuf>, env: Environment) -> Result<ServiceConfig, StartupError> {
    let path = match path {
        Some(path) => path,
        None => {
            let cwd = std::env::current_dir().map_err(StartupError::WorkingDir)?;
            config::resolve_config_path(&cwd, SERVICE_DIR, CONFIG_MODULE, env)?
        }
    };
    Ok(config::load_config(&path)?)
}

/// Build the metric sink the config selects.
pub async fn build_sink(
    config: &ServiceConfig,
    env: Environment,
) -> Result<SharedSink, StartupError> {
    let observability = &config.observability;
    let sink: SharedSink = match observability.metrics_backend {
        MetricsBackend::Datadog => Arc::new(
            DatadogSink::connect(&config.datadog.endpoint, &config.server.name, env).await?,
        ),
        MetricsBackend::Prometheus => {
            // Address was checked by validation.
            let addr = observability
                .metrics_address
                .parse()
                .map_err(|_| MetricError::Unresolved(observability.metrics_address.clone()))?;
            install_prometheus(addr)?;
            Arc::new(RecorderSink::new(&config.server.name)?)
        }
        MetricsBackend::Disabled => Arc::new(NoopSink),
    };
    tracing::info!(backend = ?observability.metrics_backend, "Metric sink ready");
    Ok(sink)
}

/// Route table with every API endpoint registered.
pub fn build_routes(config: &ServiceConfig) -> Result<RouteTable, StartupError> {
    let mut table = RouteTable::new(RouteOptions {
        prefix: config.api.prefix.clone(),
        timeout: config.api.timeout(),
    })?;
    crate::api::register(&mut table)?;
    Ok(table)
}

/// Register routes, build the server and bind its listener.
pub async fn bootstrap(config: ServiceConfig, sink: SharedSink) -> Result<Service, StartupError> {
    validate_code_table()?;

    let table = build_routes(&config)?;
    tracing::info!(
        routes = table.len(),
        prefix = %config.api.prefix,
        timeout_secs = config.api.default_timeout_secs,
        "Route table built"
    );

    let address = config.server.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    tracing::info!(address = %address, "Listening for connections");

    Ok(Service {
        server: HttpServer::new(config, table, sink),
        listener,
    })
}

/// Full process lifecycle: load, initialise, serve, drain.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), StartupError> {
    validate_code_table()?;

    let env = Environment::current();
    let config = load(config_path, env)?;
    init_logging(&config.observability)?;
    tracing::info!(
        service = %config.server.name,
        env = %env,
        bind_address = %config.server.bind_address,
        "Configuration loaded"
    );

    let sink = build_sink(&config, env).await?;
    let service = bootstrap(config, sink).await?;

    let shutdown = Shutdown::new();
    let signals = spawn_signal_handler(shutdown.clone());
    let result = service.serve(shutdown.subscribe()).await;
    signals.abort();

    result.map_err(StartupError::Serve)?;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_routes_registers_api() {
        let table = build_routes(&ServiceConfig::default()).unwrap();
        let paths: Vec<&str> = table.routes().iter().map(|r| r.path()).collect();
        assert_eq!(paths, vec!["/ddogsvc/accounts", "/ddogsvc/customers"]);
    }

    #[test]
    fn test_build_routes_rejects_bad_prefix() {
        let mut config = ServiceConfig::default();
        config.api.prefix = "ddogsvc".to_string();
        assert!(matches!(
            build_routes(&config),
            Err(StartupError::Routes(RouteError::InvalidPrefix(_)))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_binds_ephemeral_port() {
        let mut config = ServiceConfig::default();
        config.server.bind_address = "127.0.0.1:0".to_string();
        let service = bootstrap(config, Arc::new(NoopSink)).await.unwrap();
        assert_ne!(service.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_disabled_backend_is_noop() {
        let mut config = ServiceConfig::default();
        config.observability.metrics_backend = MetricsBackend::Disabled;
        let sink = build_sink(&config, Environment::Development).await.unwrap();
        assert!(sink.count("anything", 1, &[], 1.0).is_ok());
    }
}
