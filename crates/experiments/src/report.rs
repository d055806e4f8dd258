//! End-of-run reporting.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::Serialize;

use crate::{PhaseOutcome, PhaseResult};

/// Everything a finished experiment reports.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    /// Experiment name.
    pub experiment: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Total wall-clock duration.
    pub duration_ms: u64,
    /// Seed of the synthetic baselines.
    pub seed: u64,
    /// One entry per phase, in plan order.
    pub phases: Vec<PhaseResult>,
    /// Experiment-specific summary.
    pub summary: serde_json::Value,
    /// Results file written by the run, if any.
    pub results_file: Option<PathBuf>,
}

impl ExperimentReport {
    /// Number of phases that passed.
    pub fn passed(&self) -> usize {
        self.phases.iter().filter(|p| p.is_passed()).count()
    }

    /// Number of phases that failed.
    pub fn failed(&self) -> usize {
        self.phases.iter().filter(|p| p.is_failed()).count()
    }

    /// Number of phases that were skipped.
    pub fn skipped(&self) -> usize {
        self.phases.iter().filter(|p| p.is_skipped()).count()
    }

    /// Whether no phase failed.
    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

/// Prints `report` for humans.
pub fn print_report_text(report: &ExperimentReport) {
    println!();
    println!("{} ({} ms, seed {})", report.experiment, report.duration_ms, report.seed);
    println!("{}", "=".repeat(60));

    for phase in &report.phases {
        match &phase.outcome {
            PhaseOutcome::Passed => {
                println!("  \u{2713} {} ({} ms)", phase.name, phase.duration_ms);
            }
            PhaseOutcome::Failed { error } => {
                println!("  \u{2717} {} ({} ms)", phase.name, phase.duration_ms);
                println!("      {error}");
            }
            PhaseOutcome::Skipped { reason } => {
                println!("  - {} (skipped: {reason})", phase.name);
            }
        }
    }

    println!();
    println!(
        "{} passed, {} failed, {} skipped",
        report.passed(),
        report.failed(),
        report.skipped()
    );

    if !report.summary.is_null() {
        println!();
        match serde_json::to_string_pretty(&report.summary) {
            Ok(summary) => println!("{summary}"),
            Err(e) => tracing::warn!(error = %e, "Failed to render summary"),
        }
    }

    if let Some(path) = &report.results_file {
        println!();
        println!("Results written to {}", path.display());
    }
}

/// Prints `report` as a single JSON document.
pub fn print_report_json(report: &ExperimentReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
