//! Stage-by-stage run dispatching.
//!
//! Stages execute strictly one after another in byte-lexicographic
//! order of their name; within a stage the scheduler admits every run
//! whose dependencies do not collide with what is currently held, in
//! queue order. Admission binds dynamic choices greedily (first free
//! option in declared order), unions the run's effective deps into the
//! `held` ledger, launches the child and hands it to the timeout
//! supervisor. The only suspension point is waiting for some in-flight
//! run to terminate; a termination releases its deps and admission
//! resumes.
//!
//! Cancellation stops admission immediately; in-flight runs are driven
//! down the hard/kill path by their supervisors and everything still
//! queued is reported as cancelled.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::launcher::Launcher;
use crate::metadata::Timeout;
use crate::report::{RunRecord, RunReport, Verdict};
use crate::suite::Run;
use crate::supervisor::{supervise, Supervision};

pub struct Scheduler<L: Launcher> {
    launcher: Arc<L>,
    default_timeout: Option<Timeout>,
    cancel: CancellationToken,
}

impl<L: Launcher> Scheduler<L> {
    pub fn new(launcher: L, default_timeout: Option<Timeout>, cancel: CancellationToken) -> Self {
        Self {
            launcher: Arc::new(launcher),
            default_timeout,
            cancel,
        }
    }

    /// Executes all runs and returns the aggregated report.
    pub async fn run(&self, runs: Vec<Run>) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new();

        let mut stages: BTreeMap<String, Vec<Run>> = BTreeMap::new();
        for run in runs {
            stages.entry(run.stage.clone()).or_default().push(run);
        }

        for (stage, stage_runs) in stages {
            if self.cancel.is_cancelled() {
                for run in stage_runs {
                    report.push(RunRecord::skipped(&run, Verdict::Cancelled));
                }
                continue;
            }

            let stage_started = Instant::now();
            info!("Starting stage '{}' ({} suites)", stage, stage_runs.len());
            self.run_stage(stage_runs, &mut report).await;
            info!(
                "Finished stage '{}' ({:?})",
                stage,
                stage_started.elapsed()
            );
        }

        report.set_duration(started.elapsed());
        report
    }

    async fn run_stage(&self, runs: Vec<Run>, report: &mut RunReport) {
        let progress = stage_progress(runs.len() as u64);
        let mut queue: VecDeque<Run> = runs.into();
        let mut held: HashSet<String> = HashSet::new();
        let mut in_flight: JoinSet<(Run, Supervision)> = JoinSet::new();

        loop {
            if !self.cancel.is_cancelled() {
                // One front-to-back pass admits every currently
                // admissible run: `held` only grows during the pass, so
                // anything skipped stays inadmissible until the next
                // termination.
                let mut i = 0;
                while i < queue.len() {
                    let Some(chosen) = queue[i].deps.bind_greedy(&held) else {
                        i += 1;
                        continue;
                    };

                    let mut run = queue.remove(i).expect("index checked above");
                    run.bind_dynamic(chosen);

                    info!("Starting '{}'", run.name());
                    match self.launcher.launch(&run).await {
                        Ok(child) => {
                            held.extend(run.effective_deps());
                            let name = run.name();
                            let timeout = run.timeout.or(self.default_timeout);
                            let cancel = self.cancel.clone();
                            in_flight.spawn(async move {
                                let sup = supervise(child, &name, timeout, &cancel).await;
                                (run, sup)
                            });
                        }
                        Err(e) => {
                            error!("Failed to start '{}': {}", run.name(), e);
                            report.push(RunRecord::spawn_failed(&run, &e));
                            progress.inc(1);
                        }
                    }
                }
            }

            progress.set_message(format!(
                "running: {} pending: {}",
                in_flight.len(),
                queue.len()
            ));

            if in_flight.is_empty() {
                if queue.is_empty() {
                    break;
                }
                // Nothing is running, so nothing will ever be released;
                // whatever is still queued can never be admitted.
                let verdict = if self.cancel.is_cancelled() {
                    Verdict::Cancelled
                } else {
                    Verdict::BlockedUnsatisfiable
                };
                while let Some(run) = queue.pop_front() {
                    warn!("'{}' not admissible: {:?}", run.name(), verdict);
                    report.push(RunRecord::skipped(&run, verdict));
                    progress.inc(1);
                }
                break;
            }

            match in_flight.join_next().await.expect("in_flight not empty") {
                Ok((run, sup)) => {
                    for dep in run.effective_deps() {
                        held.remove(&dep);
                    }
                    info!(
                        "Finished '{}' ({:?}, {:?})",
                        run.name(),
                        sup.outcome,
                        sup.duration
                    );
                    report.push(RunRecord::finished(&run, &sup));
                    progress.inc(1);
                }
                Err(e) => {
                    // A supervision task died; its deps stay held for
                    // the rest of the stage rather than risking a
                    // collision.
                    error!("run task failed: {e}");
                }
            }
        }

        progress.finish_and_clear();
    }
}

fn stage_progress(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    bar
}
