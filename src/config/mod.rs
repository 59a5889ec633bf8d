//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! ENTENV → env.rs (Environment)
//!     → loader.rs (resolve <module>.<env>.toml, parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → startup builds the route table, metric sink and server from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use env::Environment;
pub use loader::{load_config, resolve_config_path, ConfigError};
pub use schema::{
    ApiConfig, DatadogConfig, LogFormat, MetricsBackend, ObservabilityConfig, ServerConfig,
    ServiceConfig,
};
pub use validation::{validate_config, ValidationError};
