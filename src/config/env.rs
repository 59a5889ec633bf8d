//! Deployment environment detection.

use std::fmt;

/// Variable naming the deployment environment.
pub const ENV_VAR: &str = "ENTENV";

/// Deployment environment. Anything unrecognised is development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Alpha,
    Staging,
    Production,
}

impl Environment {
    /// Read `ENTENV` from the process environment.
    pub fn current() -> Self {
        std::env::var(ENV_VAR)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "alpha" => Self::Alpha,
            "staging" => Self::Staging,
            "production" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Alpha => "alpha",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
