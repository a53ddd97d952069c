use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::checks::CheckOptions;
use crate::error::{AuditError, Result};
use crate::query::WordMorphemeReading;

pub const ENV_URI: &str = "NEO4J_URI";
pub const ENV_USER: &str = "NEO4J_USER";
pub const ENV_PASSWORD: &str = "NEO4J_PASSWORD";
pub const ENV_DATABASE: &str = "NEO4J_DATABASE";

pub const DEFAULT_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_USER: &str = "neo4j";
pub const DEFAULT_PASSWORD: &str = "password";

pub const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AuditConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub checks: CheckToggles,
    #[serde(default)]
    pub report: Option<ReportConfig>,
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

impl AuditConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let invalid = |message: String| AuditError::Config {
            path: path.to_path_buf(),
            message,
        };
        let data = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        toml::from_str(&data).map_err(|e| invalid(e.to_string()))
    }

    /// Defaults, then the optional file, then the process environment.
    ///
    /// A `.env` file in the working directory is loaded first if present;
    /// a malformed one is a config error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_env_file(Path::new(ENV_FILE))?;
        let mut config = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override connection settings from `lookup`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(uri) = read(ENV_URI) {
            self.connection.uri = uri;
        }
        if let Some(user) = read(ENV_USER) {
            self.connection.user = user;
        }
        if let Some(password) = read(ENV_PASSWORD) {
            self.connection.password = password;
        }
        if let Some(database) = read(ENV_DATABASE) {
            self.connection.database = Some(database);
        }
    }

    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            word_morpheme_reading: self.checks.word_morpheme_reading,
        }
    }

    pub fn trace_filter(&self) -> Option<&str> {
        self.telemetry.as_ref()?.trace_filter.as_deref()
    }
}

/// Export `path` into the process environment. A missing file is fine; an
/// unreadable or malformed one is not.
pub fn load_env_file(path: &Path) -> Result<()> {
    match dotenvy::from_path(path) {
        Err(err) if !err.not_found() => Err(AuditError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConnectionConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.into(),
            user: DEFAULT_USER.into(),
            password: DEFAULT_PASSWORD.into(),
            database: None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct CheckToggles {
    #[serde(default)]
    pub word_morpheme_reading: WordMorphemeReading,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub trace_filter: Option<String>,
}
