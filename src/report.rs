//! Run result aggregation and output.
//!
//! Every scheduled run ends up as one [`RunRecord`], whether it executed
//! or was dropped as unsatisfiable or cancelled. The collected
//! [`RunReport`] drives the console summary, the machine-readable
//! `report.json` and the process exit code: zero only when every run
//! exited clean with a passing status.

use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use serde::Serialize;

use crate::error::{MedusaError, Result};
use crate::suite::Run;
use crate::supervisor::{RunOutcome, Supervision};

/// Final classification of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    ExitedClean,
    ExitedAfterSoft,
    KilledAtHard,
    KilledAtKill,
    Cancelled,
    /// Never admitted: its dependency pools cannot be satisfied.
    BlockedUnsatisfiable,
    SpawnFailed,
}

impl From<RunOutcome> for Verdict {
    fn from(outcome: RunOutcome) -> Verdict {
        match outcome {
            RunOutcome::ExitedClean => Verdict::ExitedClean,
            RunOutcome::ExitedAfterSoft => Verdict::ExitedAfterSoft,
            RunOutcome::KilledAtHard => Verdict::KilledAtHard,
            RunOutcome::KilledAtKill => Verdict::KilledAtKill,
            RunOutcome::Cancelled => Verdict::Cancelled,
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub name: String,
    pub source: String,
    pub stage: String,
    pub index: usize,
    /// Injected variable bindings: for-targets plus chosen dynamic
    /// values.
    pub bindings: Vec<(String, String)>,
    /// Effective dependency set the run was admitted with.
    pub deps: Vec<String>,
    pub verdict: Verdict,
    pub exit_code: Option<i32>,
    pub duration_secs: f64,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn finished(run: &Run, sup: &Supervision) -> RunRecord {
        RunRecord {
            name: run.name(),
            source: run.source.display().to_string(),
            stage: run.stage.clone(),
            index: run.index,
            bindings: run.bindings(),
            deps: run.effective_deps(),
            verdict: sup.outcome.into(),
            exit_code: sup.status.and_then(exit_code),
            duration_secs: sup.duration.as_secs_f64(),
            error: None,
        }
    }

    pub fn spawn_failed(run: &Run, error: &MedusaError) -> RunRecord {
        RunRecord {
            name: run.name(),
            source: run.source.display().to_string(),
            stage: run.stage.clone(),
            index: run.index,
            bindings: run.bindings(),
            deps: run.effective_deps(),
            verdict: Verdict::SpawnFailed,
            exit_code: None,
            duration_secs: 0.0,
            error: Some(error.to_string()),
        }
    }

    /// For runs that never dispatched (blocked or cancelled).
    pub fn skipped(run: &Run, verdict: Verdict) -> RunRecord {
        RunRecord {
            name: run.name(),
            source: run.source.display().to_string(),
            stage: run.stage.clone(),
            index: run.index,
            bindings: run.bindings(),
            deps: Vec::new(),
            verdict,
            exit_code: None,
            duration_secs: 0.0,
            error: None,
        }
    }

    /// A run passed only if it exited on its own with status zero.
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::ExitedClean && self.exit_code == Some(0)
    }
}

fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

/// Aggregated results of a whole medusa run.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub records: Vec<RunRecord>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn new() -> RunReport {
        RunReport::default()
    }

    pub fn push(&mut self, record: RunRecord) {
        self.records.push(record);
    }

    pub fn success(&self) -> bool {
        self.records.iter().all(|r| r.passed())
    }

    /// Zero when every run exited clean and passed, one otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    fn count(&self, verdict: Verdict) -> usize {
        self.records.iter().filter(|r| r.verdict == verdict).count()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Console summary printed after all stages finished.
    pub fn print_summary(&self) {
        let passed = self.records.iter().filter(|r| r.passed()).count();
        let failed = self
            .records
            .iter()
            .filter(|r| r.verdict == Verdict::ExitedClean && !r.passed())
            .count();
        let soft = self.count(Verdict::ExitedAfterSoft);
        let killed = self.count(Verdict::KilledAtHard) + self.count(Verdict::KilledAtKill);
        let blocked = self.count(Verdict::BlockedUnsatisfiable) + self.count(Verdict::SpawnFailed);
        let cancelled = self.count(Verdict::Cancelled);

        println!();
        println!("Suite results:");
        println!("  Total:     {}", self.records.len());
        println!("  Passed:    {}", console::style(passed).green());
        println!("  Failed:    {}", console::style(failed).red());
        if soft > 0 {
            println!("  Timed out: {}", console::style(soft).yellow());
        }
        if killed > 0 {
            println!("  Killed:    {}", console::style(killed).red().bold());
        }
        if blocked > 0 {
            println!("  Blocked:   {}", console::style(blocked).red().bold());
        }
        if cancelled > 0 {
            println!("  Cancelled: {}", console::style(cancelled).yellow());
        }
        println!("  Duration:  {}s", self.duration_secs.round() as u64);

        if self.success() {
            println!();
            println!("{}", console::style("All suites passed.").green().bold());
        } else {
            println!();
            println!("{}", console::style("Some suites did not pass:").red().bold());
            for record in &self.records {
                if !record.passed() {
                    let detail = match (&record.verdict, record.exit_code) {
                        (Verdict::ExitedClean, Some(code)) => format!("exit code {code}"),
                        (verdict, _) => format!("{verdict:?}"),
                    };
                    println!("  - {} [{}] ({})", record.name, record.stage, detail);
                    if let Some(error) = &record.error {
                        println!("    {}", console::style(error).dim());
                    }
                }
            }
        }
    }
}
