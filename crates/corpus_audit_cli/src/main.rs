use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use corpus_audit_core::config::{
    ConnectionConfig, DEFAULT_PASSWORD, DEFAULT_URI, DEFAULT_USER, ENV_PASSWORD, ENV_URI, ENV_USER,
};
use corpus_audit_core::summary::{banner, render};
use corpus_audit_core::{
    run_catalog, AuditConfig, AuditError, GraphQueryService, MemoryGraph, Neo4jService,
    RunReport, ValidationRun,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    version,
    about = "Check the structural integrity of the corpus graph (read-only)"
)]
struct Cli {
    /// TOML config file; environment variables still take precedence.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Validate a JSON graph snapshot instead of connecting to Neo4j.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Also write the run as a JSON report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long)]
    run_id: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match AuditConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            init_tracing(None);
            print_fatal("Invalid configuration", &err.into(), &ConnectionConfig::default());
            return ExitCode::from(1);
        }
    };
    init_tracing(config.trace_filter());

    match handle_validate(&cli, &config) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %err, "validation aborted");
            let heading = match err.downcast_ref::<AuditError>() {
                Some(AuditError::Snapshot { .. }) => "Failed to load graph snapshot",
                Some(AuditError::Query { .. } | AuditError::Decode { .. }) => {
                    "Lost contact with the database during validation"
                }
                _ => "Failed to connect to database",
            };
            print_fatal(heading, &err, &config.connection);
            ExitCode::from(1)
        }
    }
}

/// `RUST_LOG` wins over the configured filter; logs go to stderr.
fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn handle_validate(cli: &Cli, config: &AuditConfig) -> Result<u8> {
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S")));

    // The service lives for this scope only and is released on every path out.
    let service: Box<dyn GraphQueryService> = match &cli.snapshot {
        Some(path) => {
            info!(snapshot = %path.display(), "validating graph snapshot");
            Box::new(MemoryGraph::from_json_path(path)?)
        }
        None => Box::new(Neo4jService::connect(&config.connection)?),
    };

    print!("{}", banner());
    let run = run_catalog(service.as_ref(), &config.check_options(), run_id)?;
    drop(service);

    print!("{}", render(&run));

    let report_path = cli
        .report
        .as_deref()
        .or_else(|| config.report.as_ref().map(|r| r.path.as_path()));
    // Report failures are logged; the exit status stays the run's.
    if let Some(path) = report_path {
        match write_report(&run, path) {
            Ok(()) => println!("Report written to {}", path.display()),
            Err(err) => error!(error = %format!("{err:#}"), "JSON report not written"),
        }
    }

    Ok(run.outcome().exit_code())
}

fn write_report(run: &ValidationRun, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, serde_json::to_string_pretty(&RunReport::new(run))?)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

fn print_fatal(heading: &str, err: &anyhow::Error, connection: &ConnectionConfig) {
    let rule = "=".repeat(80);
    println!("{rule}");
    println!("ERROR: {heading}");
    println!("{rule}");
    println!();
    println!("Error: {err:#}");
    println!();
    println!("Please ensure:");
    println!("  1. Neo4j is running and reachable");
    println!("  2. Environment variables are set correctly:");
    println!("     - {ENV_URI}: {} (default: {DEFAULT_URI})", connection.uri);
    println!("     - {ENV_USER}: {} (default: {DEFAULT_USER})", connection.user);
    println!(
        "     - {ENV_PASSWORD}: {} (default: {DEFAULT_PASSWORD})",
        mask(&connection.password)
    );
    println!();
    println!("If running locally, check the .env file in the working directory.");
    println!("If running in Docker, check the compose environment variables.");
    println!();
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        "<unset>".into()
    } else {
        "*".repeat(secret.chars().count().min(8))
    }
}
