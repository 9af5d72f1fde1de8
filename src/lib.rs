//! # medusa
//!
//! Runs Robot Framework suites in parallel on one host while keeping
//! suites that share a declared resource from ever executing at the
//! same time.
//!
//! Suites opt in through four `medusa:*` metadata keys:
//!
//! - `medusa:stage` — the cohort the suite belongs to; stages run one
//!   after another in name order.
//! - `medusa:deps` — the resources the suite needs. A dep is either a
//!   fixed token or a dynamic choice `ANY ${VAR} IN ${POOL}` resolved
//!   to a free pool member when the suite is dispatched.
//! - `medusa:for` — multiplies the suite into independent runs, one per
//!   element of a list or dictionary, re-resolving stage and deps with
//!   each iteration's target bindings.
//! - `medusa:timeout` — a `soft,hard,kill` escalation ladder for the
//!   suite's process.
//!
//! ## Pipeline
//!
//! ```text
//! .robot files --> robot::collect_suites --> expand::expand_suite
//!        (variable table + metadata)            (Runs per suite)
//!                                                    |
//!                       filter::Filters::match_and_narrow
//!                                                    |
//!                              scheduler::Scheduler::run
//!                       (stage loop, dep arbitration, dispatch)
//!                           |                        |
//!                  launcher::RobotLauncher   supervisor::supervise
//!                   (child robot process)    (soft/hard/kill ladder)
//!                                                    |
//!                                         report::RunReport
//! ```
//!
//! Each dispatched run is a `robot` child process with the run's
//! variable bindings injected plus `MEDUSA_STAGE`, `MEDUSA_DEPS` and
//! `MEDUSA_FOR`, writing `output.xml`, `stdout.txt` and `stderr.txt`
//! into `<outputdir>/<stage>/<run name>/`.

pub mod error;
pub mod expand;
pub mod filter;
pub mod launcher;
pub mod metadata;
pub mod report;
pub mod robot;
pub mod scheduler;
pub mod settings;
pub mod stats;
pub mod suite;
pub mod supervisor;
pub mod value;

pub use error::{MedusaError, Result};
pub use expand::expand_suite;
pub use filter::Filters;
pub use launcher::{Launcher, RobotLauncher, RunningChild};
pub use metadata::Timeout;
pub use report::{RunRecord, RunReport, Verdict};
pub use scheduler::Scheduler;
pub use settings::Settings;
pub use suite::{DepSpec, DynChoice, ParsedSuite, Run};
pub use supervisor::{supervise, RunOutcome, Supervision};
pub use value::{Value, VarTable};
