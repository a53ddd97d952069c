//! Structural integrity checks for an interlinear-text corpus stored in a
//! property graph (texts, sections, phrases, words, morphemes, glosses).

pub mod checks;
pub mod config;
pub mod error;
pub mod query;
pub mod report;
pub mod service;
pub mod summary;

pub use checks::{run_catalog, CheckOptions, CheckSpec, CATALOG};
pub use config::{AuditConfig, ConnectionConfig};
pub use error::AuditError;
pub use query::{
    GraphQuery, GraphQueryService, NodeLabel, Probe, QueryShape, Record, WordMorphemeReading,
};
pub use report::{CheckResult, Issue, Outcome, ReportSummary, RunReport, Severity, ValidationRun};
pub use service::{MemoryGraph, Neo4jService};
