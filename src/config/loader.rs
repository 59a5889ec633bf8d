//! Configuration loading from disk.
//!
//! Files are named `<module>.<env>.toml`. They are looked up in the service's
//! source directory (found by walking the working directory up to the
//! component named after the service) and then in `/etc/<service>/`.

use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::config::env::Environment;
use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("no {file} found in {}", display_dirs(.searched))]
    NotFound { file: String, searched: Vec<PathBuf> },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_dirs(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `<module>.<env>.toml`
pub fn config_file_name(module: &str, env: Environment) -> String {
    format!("{module}.{env}.toml")
}

/// The prefix of `cwd` up to and including the component named `service`.
/// The whole of `cwd` when no component matches.
pub fn service_dir(cwd: &Path, service: &str) -> PathBuf {
    let mut dir = PathBuf::new();
    for component in cwd.components() {
        dir.push(component);
        if matches!(component, Component::Normal(name) if name == service) {
            break;
        }
    }
    dir
}

/// Directories searched for config files, in order.
pub fn search_dirs(cwd: &Path, service: &str) -> Vec<PathBuf> {
    vec![
        service_dir(cwd, service),
        PathBuf::from(format!("/etc/{service}")),
    ]
}

/// Locate the config file for `module` in `env`.
pub fn resolve_config_path(
    cwd: &Path,
    service: &str,
    module: &str,
    env: Environment,
) -> Result<PathBuf, ConfigError> {
    let file = config_file_name(module, env);
    let searched = search_dirs(cwd, service);

    for dir in &searched {
        let candidate = dir.join(&file);
        if candidate.is_file() {
            tracing::info!(path = %candidate.display(), env = %env, "Config file resolved");
            return Ok(candidate);
        }
        tracing::debug!(path = %candidate.display(), "Config file not present");
    }

    Err(ConfigError::NotFound { file, searched })
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ServiceConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
