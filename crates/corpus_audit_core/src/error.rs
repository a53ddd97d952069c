use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a validation run.
///
/// Violations found in the corpus are never errors; they are recorded as
/// issues on a [`crate::CheckResult`].
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to connect to graph service at {uri}")]
    Connect {
        uri: String,
        #[source]
        source: neo4rs::Error,
    },

    #[error("graph query `{probe}` failed")]
    Query {
        probe: &'static str,
        #[source]
        source: neo4rs::Error,
    },

    #[error("column `{column}` of `{probe}` could not be decoded: {message}")]
    Decode {
        probe: &'static str,
        column: &'static str,
        message: String,
    },

    #[error("failed to start query runtime")]
    Runtime(#[source] std::io::Error),

    #[error("snapshot {path} is unreadable: {message}")]
    Snapshot { path: PathBuf, message: String },

    #[error("config {path} is invalid: {message}")]
    Config { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, AuditError>;
