//! Scenario result reporting

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::compare::ComparisonResult;
use crate::engine::EngineDialect;
use crate::harness::{ScenarioOutcome, ScenarioResult};
use crate::normalize::NormalizedChain;

/// Report over a harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessReport {
    /// Scenario runs
    pub total: usize,
    /// Runs that compared equal
    pub passed: usize,
    /// Runs that diverged
    pub failed: usize,
    /// Runs that never produced a comparable trace
    pub faulted: usize,
    /// Pass rate as percentage
    pub pass_rate: f64,
    /// Results by engine
    pub by_engine: BTreeMap<String, EngineReport>,
    /// Divergence and fault details
    pub failures: Vec<FailureInfo>,
}

/// Per-engine tallies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub faulted: usize,
}

/// A scenario run that did not pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Scenario name
    pub scenario: String,
    /// Engine dialect
    pub engine: EngineDialect,
    /// Comparison result or fault message
    pub error: String,
    /// Frame index of the divergence
    pub divergence_index: Option<usize>,
    /// Expected chain, when one was built
    pub expected: Option<NormalizedChain>,
    /// Actual chain, when one was captured
    pub actual: Option<NormalizedChain>,
}

impl HarnessReport {
    /// Generate a report from scenario results
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        let mut report = Self {
            total: results.len(),
            passed: 0,
            failed: 0,
            faulted: 0,
            pass_rate: 0.0,
            by_engine: BTreeMap::new(),
            failures: Vec::new(),
        };

        for result in results {
            let engine = report.by_engine.entry(result.engine.to_string()).or_default();
            engine.total += 1;

            match &result.outcome {
                ScenarioOutcome::Compared {
                    result: ComparisonResult::Equal,
                    ..
                } => {
                    report.passed += 1;
                    engine.passed += 1;
                }
                ScenarioOutcome::Compared {
                    expected,
                    actual,
                    result: comparison,
                } => {
                    report.failed += 1;
                    engine.failed += 1;
                    report.failures.push(FailureInfo {
                        scenario: result.scenario.clone(),
                        engine: result.engine,
                        error: comparison.to_string(),
                        divergence_index: comparison.divergence_index(),
                        expected: Some(expected.clone()),
                        actual: Some(actual.clone()),
                    });
                }
                ScenarioOutcome::Fault(fault) => {
                    report.faulted += 1;
                    engine.faulted += 1;
                    report.failures.push(FailureInfo {
                        scenario: result.scenario.clone(),
                        engine: result.engine,
                        error: fault.to_string(),
                        divergence_index: None,
                        expected: None,
                        actual: None,
                    });
                }
            }
        }

        if report.total > 0 {
            report.pass_rate = (report.passed as f64 / report.total as f64) * 100.0;
        }

        report
    }

    /// Whether every run passed
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Print a summary to stdout
    pub fn print_summary(&self) {
        println!("\n{}", "=== Stack Trace Scenarios ===".bold());
        println!("Total:   {}", self.total);
        println!(
            "Passed:  {} ({:.1}%)",
            self.passed.to_string().green(),
            self.pass_rate
        );
        println!("Failed:  {}", self.failed.to_string().red());
        println!("Faulted: {}", self.faulted.to_string().yellow());

        if !self.by_engine.is_empty() {
            println!("\n{}", "=== By Engine ===".bold());
            for (engine, tally) in &self.by_engine {
                println!(
                    "  {:<14} {}/{} passed, {} failed, {} faulted",
                    engine, tally.passed, tally.total, tally.failed, tally.faulted
                );
            }
        }

        for failure in &self.failures {
            println!(
                "\n{} {} [{}]",
                "FAIL".red().bold(),
                failure.scenario.yellow(),
                failure.engine
            );
            println!("  {}", failure.error);
            if let (Some(expected), Some(actual)) = (&failure.expected, &failure.actual) {
                println!("  {}", "expected:".cyan());
                print!("{}", expected);
                println!("  {}", "actual:".cyan());
                print!("{}", actual);
            }
        }
    }

    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
