//! Result aggregation, console contract, and exit-code policy
//!
//! Operators scan these lines in CI logs, so the textual contract is fixed:
//! a timestamped start/end banner, one `[PASS]`/`[FAIL]` line per step, and
//! a final `Summary: P/N tests passed.` regardless of outcome.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// All steps passed
pub const EXIT_OK: i32 = 0;
/// At least one recorded step failed, no fatal condition
pub const EXIT_STEP_FAILURES: i32 = 1;
/// Functional failure: the application (or its client driver) is broken
pub const EXIT_FUNCTIONAL: i32 = 2;
/// Advisory database-verification failure, non-fatal (process-driven mode)
pub const EXIT_ADVISORY: i32 = 3;
/// Network / environment error: the target never became usable
pub const EXIT_NETWORK: i32 = 9;

/// Result of one step execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub passed: bool,
    pub detail: String,
}

/// Strictly additive accumulation of step outcomes for one scenario run.
///
/// The invariant the whole harness leans on: `total()` equals the number of
/// steps actually attempted. Steps skipped after an abort are simply absent,
/// never counted as failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    outcomes: Vec<StepOutcome>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome. Never revises a previous one; recording order is
    /// execution order.
    pub fn record(&mut self, outcome: StepOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }
}

/// Final result of one scenario run: whatever was recorded before completion
/// or abort, plus the fatal condition if one ended the run early.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub summary: RunSummary,
    #[serde(serialize_with = "serialize_fatal")]
    pub fatal: Option<HarnessError>,
}

fn serialize_fatal<S: serde::Serializer>(
    fatal: &Option<HarnessError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match fatal {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl RunReport {
    /// Map the aggregate onto a process exit code. A fatal condition yields
    /// a hard-failure code distinct from "some assertions failed".
    pub fn exit_code(&self) -> i32 {
        match &self.fatal {
            Some(e) if e.is_environmental() => EXIT_NETWORK,
            Some(_) => EXIT_FUNCTIONAL,
            None if self.summary.all_passed() => EXIT_OK,
            None => EXIT_STEP_FAILURES,
        }
    }
}

/// Prints the operator-facing console contract.
///
/// Uses plain stdout/stderr rather than tracing. Log scrapers match these
/// lines verbatim, so they must not pass through any filter layer.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn start_banner(&self) {
        println!("---[ {} - Smoke test ]---", Local::now().format("%H:%M:%S"));
    }

    pub fn end_banner(&self) {
        println!(
            "---[ {} - Smoke test complete ]---",
            Local::now().format("%H:%M:%S")
        );
    }

    /// One line per step, failures on the error stream.
    pub fn step(&self, outcome: &StepOutcome) {
        if outcome.passed {
            println!("[PASS] {}", outcome.detail);
        } else {
            eprintln!("[FAIL] {}", outcome.detail);
        }
    }

    pub fn warn(&self, message: &str) {
        println!("[WARN] {}", message);
    }

    pub fn info(&self, message: &str) {
        println!("[INFO] {}", message);
    }

    pub fn fatal(&self, error: &HarnessError) {
        eprintln!("[FAIL] {}", error);
    }

    pub fn summary(&self, summary: &RunSummary) {
        println!(
            "Summary: {}/{} tests passed.",
            summary.passed(),
            summary.total()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_case::test_case;

    fn outcome(step: &str, passed: bool) -> StepOutcome {
        StepOutcome {
            step: step.to_string(),
            passed,
            detail: step.to_string(),
        }
    }

    #[test]
    fn summary_counts_only_recorded_outcomes() {
        let mut summary = RunSummary::new();
        assert_eq!(summary.total(), 0);
        assert!(summary.all_passed());

        summary.record(outcome("one", true));
        summary.record(outcome("two", false));
        summary.record(outcome("three", true));

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.passed(), 2);
        assert!(!summary.all_passed());
        assert_eq!(summary.outcomes()[1].step, "two");
    }

    #[test_case(true, 0 ; "all passed")]
    #[test_case(false, 1 ; "some failed")]
    fn exit_code_without_fatal(pass_second: bool, expected: i32) {
        let mut summary = RunSummary::new();
        summary.record(outcome("one", true));
        summary.record(outcome("two", pass_second));

        let report = RunReport {
            scenario: "demo".to_string(),
            summary,
            fatal: None,
        };
        assert_eq!(report.exit_code(), expected);
    }

    #[test]
    fn readiness_timeout_is_a_network_exit() {
        let report = RunReport {
            scenario: "demo".to_string(),
            summary: RunSummary::new(),
            fatal: Some(HarnessError::ReadinessTimeout {
                target: "http://localhost:8080/".to_string(),
                elapsed: Duration::from_secs(60),
            }),
        };
        assert_eq!(report.exit_code(), EXIT_NETWORK);
    }

    #[test]
    fn element_not_found_is_a_functional_exit() {
        let mut summary = RunSummary::new();
        summary.record(outcome("one", true));

        let report = RunReport {
            scenario: "demo".to_string(),
            summary,
            fatal: Some(HarnessError::ElementNotFound {
                locator: "Number:".to_string(),
                attempts: 10,
            }),
        };
        assert_eq!(report.exit_code(), EXIT_FUNCTIONAL);
    }

    #[test]
    fn report_serializes_fatal_as_text() {
        let report = RunReport {
            scenario: "demo".to_string(),
            summary: RunSummary::new(),
            fatal: Some(HarnessError::Transport("connection refused".to_string())),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fatal"], "transport failure: connection refused");
    }
}
