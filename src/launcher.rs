//! Launching suite processes.
//!
//! The scheduler talks to the external runner through two small traits:
//! a [`Launcher`] spawns a child for an admitted run and hands back a
//! [`RunningChild`] the timeout supervisor can signal and await.
//! [`RobotLauncher`] is the production implementation driving the
//! `robot` command line; tests substitute scripted fakes.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{MedusaError, Result};
use crate::settings::Settings;
use crate::suite::Run;

/// Spawns one child process per admitted run.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    type Child: RunningChild;

    async fn launch(&self, run: &Run) -> Result<Self::Child>;
}

/// A dispatched child process, as seen by the timeout supervisor.
///
/// `interrupt` asks the runner to wind down: the first interrupt means
/// "skip to teardown", a second one means "stop immediately". `kill` is
/// unconditional. `wait` must be cancel safe — the supervisor drops and
/// re-creates the wait future around its timer deadlines.
#[async_trait]
pub trait RunningChild: Send + 'static {
    fn interrupt(&mut self);

    fn kill(&mut self);

    async fn wait(&mut self) -> std::io::Result<ExitStatus>;
}

/// Runs suites through the `robot` command line tool.
pub struct RobotLauncher {
    settings: Settings,
}

impl RobotLauncher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Result directory for a run: `<outputdir>/<stage>/<run name>/`.
    fn result_dir(&self, run: &Run) -> PathBuf {
        self.settings.outputdir.join(&run.stage).join(run.name())
    }
}

#[async_trait]
impl Launcher for RobotLauncher {
    type Child = RobotChild;

    async fn launch(&self, run: &Run) -> Result<RobotChild> {
        let result_dir = self.result_dir(run);
        if result_dir.exists() {
            return Err(MedusaError::Spawn {
                name: run.name(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("result directory '{}' already exists", result_dir.display()),
                ),
            });
        }
        std::fs::create_dir_all(&result_dir)?;

        let stdout = std::fs::File::create(result_dir.join("stdout.txt"))?;
        let stderr = std::fs::File::create(result_dir.join("stderr.txt"))?;

        let mut cmd = tokio::process::Command::new(&self.settings.robot_bin);
        cmd.args(robot_args(run, &self.settings, &result_dir));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(stdout));
        cmd.stderr(Stdio::from(stderr));

        // Give the child its own process group so an interrupt typed at
        // the medusa terminal does not reach it directly; escalation is
        // the supervisor's job.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| MedusaError::Spawn {
            name: run.name(),
            source: e,
        })?;

        debug!("spawned '{}' (pid {:?})", run.name(), child.id());
        Ok(RobotChild {
            name: run.name(),
            child,
        })
    }
}

/// Builds the child's argument list: forwarded robot options first, then
/// medusa's variable and metadata injection, then output redirection and
/// the suite source.
pub fn robot_args(run: &Run, settings: &Settings, result_dir: &std::path::Path) -> Vec<String> {
    let mut args = settings.robot_args.clone();

    let deps_joined = run.effective_deps().join("    ");

    for (name, value) in run.bindings() {
        args.push("--variable".to_string());
        args.push(format!("{name}:{value}"));
    }

    args.push("--variable".to_string());
    args.push(format!("MEDUSA_STAGE:{}", run.stage));
    args.push("--variable".to_string());
    args.push(format!("MEDUSA_DEPS:{deps_joined}"));

    if !run.for_bindings.is_empty() {
        let pairs: Vec<String> = run
            .for_bindings
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        args.push("--variable".to_string());
        args.push(format!("MEDUSA_FOR:{}", pairs.join(", ")));
    }

    // The suite's own metadata is rewritten to the resolved values so
    // the report shows what actually applied to this run.
    args.push("--metadata".to_string());
    args.push(format!("medusa:stage:{}", run.stage));
    args.push("--metadata".to_string());
    args.push(format!("medusa:deps:{deps_joined}"));

    args.push("--log".to_string());
    args.push("NONE".to_string());
    args.push("--report".to_string());
    args.push("NONE".to_string());
    args.push("--output".to_string());
    args.push(result_dir.join("output.xml").display().to_string());

    args.push(run.source.display().to_string());
    args
}

/// A running `robot` process.
pub struct RobotChild {
    name: String,
    child: tokio::process::Child,
}

#[async_trait]
impl RunningChild for RobotChild {
    fn interrupt(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match self.child.id() {
                Some(pid) => {
                    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
                        warn!("failed to interrupt '{}': {}", self.name, e);
                    }
                }
                None => debug!("'{}' already exited, interrupt skipped", self.name),
            }
        }
        #[cfg(not(unix))]
        {
            // No interrupt equivalent; escalate straight to kill.
            if let Err(e) = self.child.start_kill() {
                warn!("failed to stop '{}': {}", self.name, e);
            }
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("failed to kill '{}': {}", self.name, e);
        }
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}
