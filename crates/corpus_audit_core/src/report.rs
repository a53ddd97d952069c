use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One full pass of the catalog over the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRun {
    pub id: String,
    pub timestamp: String,
    pub checks: Vec<CheckResult>,
}

impl ValidationRun {
    pub fn new(id: impl Into<String>, checks: Vec<CheckResult>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now().to_rfc3339(),
            checks,
        }
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    /// Failed checks of one severity, in catalog order.
    pub fn failures(&self, severity: Severity) -> impl Iterator<Item = &CheckResult> {
        self.checks
            .iter()
            .filter(move |c| !c.passed() && c.severity == severity)
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_failed(
            self.checks
                .iter()
                .filter(|c| !c.passed())
                .map(|c| c.severity),
        )
    }
}

/// Serialized form of a run, written as the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    #[serde(flatten)]
    pub run: &'a ValidationRun,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSummary {
    pub outcome: Outcome,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl<'a> RunReport<'a> {
    pub fn new(run: &'a ValidationRun) -> Self {
        Self {
            run,
            summary: ReportSummary {
                outcome: run.outcome(),
                total: run.total(),
                passed: run.passed(),
                failed: run.failed(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single violation with the identifiers needed to locate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl Issue {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub severity: Severity,
    pub issues: Vec<Issue>,
    /// Offending records in the store, including those past the sample cap.
    pub violations: u64,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, severity: Severity) -> Self {
        Self {
            name: name.into(),
            severity,
            issues: Vec::new(),
            violations: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn record(&mut self, issue: Issue) {
        self.issues.push(issue);
        self.violations += 1;
    }

    /// Raise the violation count to a total observed beyond the recorded sample.
    pub fn observe_total(&mut self, recorded_before: usize, total: u64) {
        let sampled = (self.issues.len() - recorded_before) as u64;
        self.violations += total.saturating_sub(sampled);
    }

    pub fn summary_line(&self) -> String {
        if self.passed() {
            format!("✓ {}: PASSED", self.name)
        } else {
            format!("✗ {}: FAILED ({} issue(s))", self.name, self.violations)
        }
    }
}

/// Final verdict of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    PassedWithWarnings,
    Failed,
}

impl Outcome {
    /// Verdict from the severities of the failed checks.
    pub fn from_failed(severities: impl IntoIterator<Item = Severity>) -> Self {
        let mut outcome = Outcome::Passed;
        for severity in severities {
            match severity {
                Severity::Error => return Outcome::Failed,
                Severity::Warning => outcome = Outcome::PassedWithWarnings,
                Severity::Info => {}
            }
        }
        outcome
    }

    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Passed | Outcome::PassedWithWarnings => 0,
            Outcome::Failed => 1,
        }
    }
}
