//! The `stats` subcommand: suite statistics without executing anything.
//!
//! Works on the expanded (and filtered) run list, so a `medusa:for`
//! suite contributes one entry per run, exactly as it would during
//! execution.

use std::collections::BTreeMap;

use crate::error::{MedusaError, Result};
use crate::suite::Run;

/// Which sections `-s/--select` asked for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub deps: bool,
    pub dynamic: bool,
    pub statics: bool,
    pub stages: bool,
    pub suites: bool,
    pub tags: bool,
    pub totals: bool,
}

impl Selection {
    pub fn all() -> Selection {
        Selection {
            deps: true,
            dynamic: true,
            statics: true,
            stages: true,
            suites: true,
            tags: true,
            totals: true,
        }
    }

    /// Parses a comma-separated selection such as `stages,totals`.
    pub fn parse(value: &str) -> Result<Selection> {
        let mut selection = Selection::default();
        for item in value.split(',').map(str::trim) {
            match item {
                "all" => return Ok(Selection::all()),
                "deps" => selection.deps = true,
                "dynamic" => selection.dynamic = true,
                "static" => selection.statics = true,
                "stages" => selection.stages = true,
                "suites" => selection.suites = true,
                "tags" => selection.tags = true,
                "totals" => selection.totals = true,
                other => {
                    return Err(MedusaError::InvalidSelection {
                        value: other.to_string(),
                    })
                }
            }
        }
        Ok(selection)
    }
}

/// Counters accumulated over all runs.
#[derive(Debug, Default)]
pub struct Stats {
    /// Distinct static dep -> number of runs using it.
    pub static_cnt: BTreeMap<String, usize>,
    /// Distinct dynamic option -> number of runs offering it.
    pub dynamic_cnt: BTreeMap<String, usize>,
    /// Tag -> number of tests carrying it.
    pub tag_cnt: BTreeMap<String, usize>,
    /// Stage -> (runs, tests).
    pub stages: BTreeMap<String, (usize, usize)>,
    pub n_runs: usize,
    pub n_tests: usize,
}

impl Stats {
    pub fn collect(runs: &[Run]) -> Stats {
        let mut stats = Stats::default();

        for run in runs {
            stats.n_runs += 1;
            stats.n_tests += run.n_tests;

            let stage = stats.stages.entry(run.stage.clone()).or_default();
            stage.0 += 1;
            stage.1 += run.n_tests;

            for dep in &run.deps.statics {
                *stats.static_cnt.entry(dep.clone()).or_default() += 1;
            }

            // A run counts once per distinct option, no matter how many
            // of its choices offer it.
            let mut seen: Vec<&str> = Vec::new();
            for choice in &run.deps.dynamics {
                for option in &choice.options {
                    if !seen.contains(&option.as_str()) {
                        seen.push(option);
                        *stats.dynamic_cnt.entry(option.clone()).or_default() += 1;
                    }
                }
            }

            for tag in &run.tags {
                *stats.tag_cnt.entry(tag.clone()).or_default() += 1;
            }
        }

        stats
    }
}

pub fn print_stats(runs: &[Run], selection: Selection) {
    let stats = Stats::collect(runs);

    if selection.totals {
        print_totals(&stats);
    }
    if selection.stages {
        print_stages(&stats);
    }
    if selection.tags {
        print_tags(&stats);
    }
    if selection.suites {
        print_suites(runs);
    }
    if selection.deps {
        print_deps(&stats);
    } else {
        if selection.dynamic {
            print_counter("Dynamic deps", &stats.dynamic_cnt, "Suite", "Suites");
        }
        if selection.statics {
            print_counter("Static deps", &stats.static_cnt, "Suite", "Suites");
        }
    }
}

fn print_totals(stats: &Stats) {
    print_title("Totals");
    println!("Stages: {}", stats.stages.len());
    println!("Suites: {}", stats.n_runs);
    println!("Tests: {}", stats.n_tests);
    println!("Tags: {}", stats.tag_cnt.len());

    let mut all_deps: Vec<&String> = stats.static_cnt.keys().collect();
    for dep in stats.dynamic_cnt.keys() {
        if !all_deps.contains(&dep) {
            all_deps.push(dep);
        }
    }
    println!("Deps total: {}", all_deps.len());
    println!("  static: {}", stats.static_cnt.len());
    println!("  dynamic: {}", stats.dynamic_cnt.len());
    println!();
}

fn print_stages(stats: &Stats) {
    print_title("Stages");
    for (name, (runs, tests)) in &stats.stages {
        let s_unit = if *runs == 1 { "Suite" } else { "Suites" };
        let t_unit = if *tests == 1 { "Test" } else { "Tests" };
        println!("{name}: {runs} {s_unit}, {tests} {t_unit}");
    }
    println!();
}

fn print_tags(stats: &Stats) {
    print_title("Tags");
    for (name, count) in &stats.tag_cnt {
        let unit = if *count == 1 { "Test" } else { "Tests" };
        println!("{name}: {count} {unit}");
    }
    println!();
}

fn print_suites(runs: &[Run]) {
    print_title("Suites");

    let mut by_stage: BTreeMap<&str, Vec<&Run>> = BTreeMap::new();
    for run in runs {
        by_stage.entry(run.stage.as_str()).or_default().push(run);
    }

    for (stage, mut stage_runs) in by_stage {
        println!("Stage {stage}");
        stage_runs.sort_by_key(|r| r.name());
        for run in stage_runs {
            if run.for_bindings.is_empty() {
                println!("  {}", run.source.display());
            } else {
                let bindings: Vec<String> = run
                    .for_bindings
                    .iter()
                    .map(|(k, v)| format!("{k}=\"{}\"", v.replace('"', "\\\"")))
                    .collect();
                println!("  {}: {}", run.source.display(), bindings.join(", "));
            }
        }
        println!();
    }
}

fn print_deps(stats: &Stats) {
    print_title("Deps");
    let mut total: BTreeMap<&String, usize> = BTreeMap::new();
    for (name, count) in stats.static_cnt.iter().chain(stats.dynamic_cnt.iter()) {
        *total.entry(name).or_default() += count;
    }
    for (name, count) in total {
        let unit = if count == 1 { "Suite" } else { "Suites" };
        let statics = stats.static_cnt.get(name.as_str()).copied().unwrap_or(0);
        let dynamic = stats.dynamic_cnt.get(name.as_str()).copied().unwrap_or(0);
        println!("{name}: {count} {unit} (static: {statics}, dynamic: {dynamic})");
    }
    println!();
}

fn print_counter(title: &str, counter: &BTreeMap<String, usize>, one: &str, many: &str) {
    print_title(title);
    for (name, count) in counter {
        let unit = if *count == 1 { one } else { many };
        println!("  {name}: {count} {unit}");
    }
    println!();
}

fn print_title(title: &str) {
    let total = 40usize;
    let fillers = total.saturating_sub(title.len() + 2);
    let before = fillers / 2;
    let after = fillers - before;
    println!("{} {} {}", "=".repeat(before), title, "=".repeat(after));
}
