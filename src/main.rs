//! medusa CLI - run Robot Framework suites with dependency-aware
//! parallelization.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use medusa::expand::expand_suite;
use medusa::filter::Filters;
use medusa::launcher::RobotLauncher;
use medusa::metadata::Timeout;
use medusa::robot::collect_suites;
use medusa::scheduler::Scheduler;
use medusa::settings::{default_outputdir, Settings};
use medusa::stats::{print_stats, Selection};
use medusa::suite::Run;

#[derive(Parser)]
#[command(name = "medusa")]
#[command(about = "Run Robot Framework suites with dependency-aware parallelization")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the given robot suite(s)
    Run {
        /// Store results in OUTPUTDIR; must not already exist
        #[arg(short = 'd', long, value_name = "OUTPUTDIR")]
        outputdir: Option<PathBuf>,

        /// Only process suites that match FILTER, e.g. 'stage=first' or
        /// 'deps~net,!usb'; can be given multiple times
        #[arg(short = 'f', long = "filter", value_name = "FILTER")]
        filters: Vec<String>,

        /// Default per-suite timeout: SOFT[,HARD[,KILL]] in seconds
        #[arg(short = 't', long, value_name = "TIMEOUT")]
        timeout: Option<String>,

        /// Suite paths, plus options forwarded to robot after '--'
        #[arg(required = true, value_name = "ROBOTARGS")]
        robotargs: Vec<String>,
    },

    /// Display information about the given robot suite(s)
    Stats {
        /// Only process suites that match FILTER; can be given multiple
        /// times
        #[arg(short = 'f', long = "filter", value_name = "FILTER")]
        filters: Vec<String>,

        /// Comma-separated selection of stats: all, deps, dynamic,
        /// static, stages, suites, tags, totals
        #[arg(short = 's', long, default_value = "all", value_name = "SELECTION")]
        select: String,

        /// Suite paths, plus options forwarded to robot after '--'
        #[arg(required = true, value_name = "ROBOTARGS")]
        robotargs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run {
            outputdir,
            filters,
            timeout,
            robotargs,
        } => run(outputdir, filters, timeout, robotargs, cli.verbose).await?,
        Commands::Stats {
            filters,
            select,
            robotargs,
        } => {
            init_logging(cli.verbose, None)?;
            stats(filters, &select, robotargs)?
        }
    };

    std::process::exit(code);
}

async fn run(
    outputdir: Option<PathBuf>,
    filter_args: Vec<String>,
    timeout: Option<String>,
    robotargs: Vec<String>,
    verbose: bool,
) -> Result<i32> {
    let timeout = timeout
        .as_deref()
        .map(Timeout::parse)
        .transpose()
        .context("invalid --timeout value")?;
    let filters = Filters::parse(&filter_args)?;

    let outputdir = outputdir.unwrap_or_else(default_outputdir);
    if outputdir.exists() {
        bail!("output directory '{}' already exists", outputdir.display());
    }
    std::fs::create_dir_all(&outputdir)
        .with_context(|| format!("failed to create output directory '{}'", outputdir.display()))?;

    init_logging(verbose, Some(&outputdir.join("medusa.log")))?;

    let (runs, rejected) = load_runs(&robotargs, &filters)?;
    if runs.is_empty() {
        bail!("No tests found, nothing to run!");
    }

    let (_, forwarded) = split_robot_args(&robotargs);
    let settings = Settings::new(outputdir.clone(), forwarded, timeout);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(
                    "Interrupt received, stopping execution; \
                     running suites are being terminated"
                );
                cancel.cancel();
            }
        }
    });

    let scheduler = Scheduler::new(RobotLauncher::new(settings), timeout, cancel);
    let report = scheduler.run(runs).await;

    report.write_json(&outputdir.join("report.json"))?;
    report.print_summary();
    println!("Results: {}", outputdir.display());

    // Rejected suites never ran anything, which must not pass silently.
    if rejected > 0 {
        error!("{rejected} suite(s) were rejected and did not run");
        return Ok(report.exit_code().max(1));
    }
    Ok(report.exit_code())
}

fn stats(filter_args: Vec<String>, select: &str, robotargs: Vec<String>) -> Result<i32> {
    let selection = Selection::parse(select)?;
    let filters = Filters::parse(&filter_args)?;

    let (runs, rejected) = load_runs(&robotargs, &filters)?;
    print_stats(&runs, selection);

    Ok(if rejected > 0 { 1 } else { 0 })
}

/// Collects, expands and filters all suites named by `robotargs`.
/// Returns the runnable runs plus the number of rejected suites;
/// rejections are logged but only abort when nothing is left to run.
fn load_runs(robotargs: &[String], filters: &Filters) -> Result<(Vec<Run>, usize)> {
    let (paths, _) = split_robot_args(robotargs);
    if paths.is_empty() {
        bail!("no existing suite files or directories among the given arguments");
    }

    let suites = collect_suites(&paths)?;
    let mut runs = Vec::new();
    let mut rejected = 0usize;

    for suite in &suites {
        match expand_suite(suite) {
            Ok(expanded) => {
                for mut run in expanded {
                    if filters.match_and_narrow(&mut run) {
                        runs.push(run);
                    }
                }
            }
            Err(e) => {
                rejected += 1;
                error!("{e}");
            }
        }
    }

    Ok((runs, rejected))
}

/// Splits ROBOTARGS into suite locations (arguments naming existing
/// files or directories) and options forwarded verbatim to the child
/// `robot` processes.
fn split_robot_args(robotargs: &[String]) -> (Vec<PathBuf>, Vec<String>) {
    let mut paths = Vec::new();
    let mut forwarded = Vec::new();
    for arg in robotargs {
        let path = PathBuf::from(arg);
        if path.exists() {
            paths.push(path);
        } else {
            forwarded.push(arg.clone());
        }
    }
    (paths, forwarded)
}

/// Stderr logging at INFO (DEBUG with `-v`); during `run` everything
/// down to DEBUG additionally goes to `<outputdir>/medusa.log`.
fn init_logging(verbose: bool, log_file: Option<&std::path::Path>) -> Result<()> {
    let stderr_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_level);

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create log file '{}'", path.display()))?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_target(false)
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
        }
    }

    Ok(())
}
