//! Plain-text rendering of a [`ValidationRun`].

use std::fmt::Write;

use crate::report::{CheckResult, Outcome, Severity, ValidationRun};

const RULE_WIDTH: usize = 80;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Heading printed before the catalog starts.
pub fn banner() -> String {
    format!("{}\nCorpus Database Validation\n{}\n", rule(), rule())
}

/// Example issues listed per failed check.
pub fn sample_size(severity: Severity) -> usize {
    match severity {
        Severity::Error => 5,
        Severity::Warning | Severity::Info => 3,
    }
}

pub fn verdict(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Failed => "❌ Validation FAILED - Errors found",
        Outcome::PassedWithWarnings => "⚠️  Validation PASSED with warnings",
        Outcome::Passed => "✅ Validation PASSED - No issues found",
    }
}

pub fn render(run: &ValidationRun) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_summary(&mut out, run);
    out
}

fn write_summary(out: &mut String, run: &ValidationRun) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}", rule())?;
    writeln!(out, "VALIDATION SUMMARY")?;
    writeln!(out, "{}", rule())?;
    writeln!(out)?;
    writeln!(out, "Total Checks: {}", run.total())?;
    writeln!(out, "Passed: {}", run.passed())?;
    writeln!(out, "Failed: {}", run.failed())?;
    writeln!(out)?;

    for (severity, heading) in [
        (Severity::Error, "ERRORS:"),
        (Severity::Warning, "WARNINGS:"),
        (Severity::Info, "INFO:"),
    ] {
        let failures: Vec<&CheckResult> = run.failures(severity).collect();
        if failures.is_empty() {
            continue;
        }
        writeln!(out, "{heading}")?;
        for result in failures {
            write_failure(out, result, sample_size(severity))?;
        }
        writeln!(out)?;
    }

    if run.passed() > 0 {
        writeln!(out, "PASSED CHECKS:")?;
        for result in run.checks.iter().filter(|c| c.passed()) {
            writeln!(out, "  {}", result.summary_line())?;
        }
        writeln!(out)?;
    }

    writeln!(out, "{}", rule())?;
    writeln!(out, "{}", verdict(run.outcome()))
}

fn write_failure(out: &mut String, result: &CheckResult, shown: usize) -> std::fmt::Result {
    writeln!(out, "  {}", result.summary_line())?;
    let printed = result.issues.iter().take(shown);
    let printed_count = printed.len() as u64;
    for issue in printed {
        writeln!(out, "    - {}", issue.description)?;
    }
    if result.violations > printed_count {
        writeln!(out, "    ... and {} more", result.violations - printed_count)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Issue;

    fn failing(name: &str, severity: Severity, issues: usize) -> CheckResult {
        let mut result = CheckResult::new(name, severity);
        for i in 0..issues {
            result.record(Issue::new(format!("issue {i}")));
        }
        result
    }

    #[test]
    fn errors_show_five_examples() {
        let run = ValidationRun::new("t", vec![failing("Orphaned Words", Severity::Error, 7)]);
        let text = render(&run);
        assert!(text.contains("    - issue 4\n"));
        assert!(!text.contains("    - issue 5\n"));
        assert!(text.contains("    ... and 2 more\n"));
        assert!(text.ends_with("❌ Validation FAILED - Errors found\n"));
    }

    #[test]
    fn warnings_show_three_examples() {
        let run = ValidationRun::new(
            "t",
            vec![failing("Word-Morpheme Consistency", Severity::Warning, 4)],
        );
        let text = render(&run);
        assert!(text.contains("WARNINGS:\n"));
        assert!(text.contains("    - issue 2\n"));
        assert!(!text.contains("    - issue 3\n"));
        assert!(text.contains("    ... and 1 more\n"));
        assert!(text.ends_with("⚠️  Validation PASSED with warnings\n"));
    }

    #[test]
    fn no_suffix_when_everything_is_shown() {
        let run = ValidationRun::new("t", vec![failing("Orphaned Glosses", Severity::Error, 5)]);
        assert!(!render(&run).contains("... and"));
    }

    #[test]
    fn clean_run_lists_passed_checks() {
        let run = ValidationRun::new(
            "t",
            vec![CheckResult::new("Orphaned Sections", Severity::Error)],
        );
        let text = render(&run);
        assert!(text.contains("Failed: 0\n"));
        assert!(text.contains("PASSED CHECKS:\n  ✓ Orphaned Sections: PASSED\n"));
        assert!(!text.contains("ERRORS:"));
        assert!(text.ends_with("✅ Validation PASSED - No issues found\n"));
    }
}
