//! Per-run timeout supervision.
//!
//! Every dispatched run is driven through an escalation ladder measured
//! from dispatch time: after `soft` seconds the child is interrupted
//! once (skip to teardown), after `hard` seconds it is interrupted again
//! (stop immediately), and `kill` seconds after that it is killed
//! unconditionally. A child that exits on its own cancels whatever is
//! left of the ladder.
//!
//! Top-level cancellation short-circuits the ladder: the run jumps
//! straight to the hard step and then falls through the kill window.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::launcher::RunningChild;
use crate::metadata::{Timeout, DEFAULT_KILL};

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exited before any timer fired.
    ExitedClean,
    /// Exited after the soft interrupt but before the hard one.
    ExitedAfterSoft,
    /// Exited inside the kill window following the hard interrupt.
    KilledAtHard,
    /// Survived the kill window and was killed unconditionally.
    KilledAtKill,
    /// Terminated because the whole run was cancelled by the user.
    Cancelled,
}

/// Supervision result: the outcome plus the child's exit status (absent
/// when waiting on the child itself failed).
#[derive(Debug)]
pub struct Supervision {
    pub outcome: RunOutcome,
    pub status: Option<ExitStatus>,
    pub duration: Duration,
}

enum PhaseEnd {
    Exited(std::io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

async fn wait_phase<C: RunningChild>(
    child: &mut C,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
    cancel_armed: bool,
) -> PhaseEnd {
    tokio::select! {
        status = child.wait() => PhaseEnd::Exited(status),
        _ = sleep_until_opt(deadline) => PhaseEnd::Deadline,
        _ = cancel.cancelled(), if cancel_armed => PhaseEnd::Cancelled,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Supervises one child until it terminates, enforcing the timeout
/// ladder. With no timeout the child only ever ends on its own or
/// through cancellation.
pub async fn supervise<C: RunningChild>(
    mut child: C,
    name: &str,
    timeout: Option<Timeout>,
    cancel: &CancellationToken,
) -> Supervision {
    let started = Instant::now();
    let kill_grace = timeout
        .map(|t| t.kill_grace())
        .unwrap_or(Duration::from_secs(DEFAULT_KILL));

    let mut cancelled = false;
    // Interrupts delivered so far; the hard step means "two".
    let mut interrupts = 0u32;

    let done = |outcome: RunOutcome, status: std::io::Result<ExitStatus>| Supervision {
        outcome,
        status: status.ok(),
        duration: started.elapsed(),
    };

    // Phase one: undisturbed until the soft deadline.
    let soft_at = timeout.map(|t| started + t.soft_after());
    match wait_phase(&mut child, soft_at, cancel, true).await {
        PhaseEnd::Exited(status) => return done(RunOutcome::ExitedClean, status),
        PhaseEnd::Cancelled => cancelled = true,
        PhaseEnd::Deadline => {
            warn!("'{}' exceeded soft timeout", name);
            child.interrupt();
            interrupts = 1;

            // Phase two: teardown until the hard deadline. Both timers
            // run from dispatch, so soft == hard degenerates into an
            // immediate hard step.
            let hard_at = timeout.map(|t| started + t.hard_after());
            match wait_phase(&mut child, hard_at, cancel, true).await {
                PhaseEnd::Exited(status) => return done(RunOutcome::ExitedAfterSoft, status),
                PhaseEnd::Cancelled => cancelled = true,
                PhaseEnd::Deadline => warn!("'{}' exceeded hard timeout", name),
            }
        }
    }

    // Hard step, reached through the hard deadline or cancellation.
    while interrupts < 2 {
        child.interrupt();
        interrupts += 1;
    }

    // Phase three: the kill window.
    let kill_at = Instant::now() + kill_grace;
    loop {
        match wait_phase(&mut child, Some(kill_at), cancel, !cancelled).await {
            PhaseEnd::Exited(status) => {
                let outcome = if cancelled {
                    RunOutcome::Cancelled
                } else {
                    RunOutcome::KilledAtHard
                };
                return done(outcome, status);
            }
            PhaseEnd::Cancelled => cancelled = true,
            PhaseEnd::Deadline => break,
        }
    }

    warn!("'{}' exceeded kill timeout", name);
    child.kill();
    let status = child.wait().await;
    let outcome = if cancelled {
        RunOutcome::Cancelled
    } else {
        RunOutcome::KilledAtKill
    };
    done(outcome, status)
}
