//! Stage and dependency filters (`-f/--filter`).
//!
//! Filter expressions have the form `<KEY><OP><VALUE>[,<VALUE>]...`
//! where KEY is `stage` or `deps`, OP is `=` (only) or `~` (any, deps
//! only) and a `!` prefix on a value turns it into an exclusion.
//! Filtering happens after expansion, so each run of a `medusa:for`
//! suite is matched on its own resolved stage and deps; dynamic option
//! pools are narrowed in place to honor dep exclusions and inclusions.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MedusaError, Result};
use crate::settings::is_valid_meta_name;
use crate::suite::Run;

static FILTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<key>deps|stage)(?P<op>[=~])(?P<vals>.+)$").unwrap());

/// How dep inclusion values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepsOp {
    /// `deps=`: a run may only use the listed deps.
    Only,
    /// `deps~`: a run must use at least one of the listed deps.
    Any,
}

/// Combined filter state built from all `-f` arguments.
#[derive(Debug, Default)]
pub struct Filters {
    active: bool,
    deps_excl: HashSet<String>,
    deps_incl: HashSet<String>,
    stage_excl: HashSet<String>,
    stage_incl: HashSet<String>,
    mode: Option<DepsOp>,
}

impl Filters {
    pub fn parse(args: &[String]) -> Result<Filters> {
        let mut filters = Filters {
            active: !args.is_empty(),
            ..Filters::default()
        };

        for arg in args {
            let caps = FILTER_RE.captures(arg).ok_or_else(|| MedusaError::InvalidFilter {
                reason: format!("'{arg}' has invalid format"),
            })?;
            let key = &caps["key"];
            let op = &caps["op"];

            if key == "stage" && op != "=" {
                return Err(MedusaError::InvalidFilter {
                    reason: "the 'stage' filter can only be used with the '=' operator".to_string(),
                });
            }

            let mut incl: HashSet<String> = HashSet::new();
            let mut excl: HashSet<String> = HashSet::new();
            for raw in caps["vals"].split(',') {
                let (set, value) = match raw.strip_prefix('!') {
                    Some(v) => (&mut excl, v),
                    None => (&mut incl, raw),
                };
                if !is_valid_meta_name(value) {
                    return Err(MedusaError::InvalidFilter {
                        reason: format!("value '{value}' is not a valid metadata name"),
                    });
                }
                set.insert(value.to_string());
            }

            if key == "stage" {
                filters.stage_incl.extend(incl);
                filters.stage_excl.extend(excl);
            } else {
                let op = if op == "=" { DepsOp::Only } else { DepsOp::Any };
                match filters.mode {
                    None => filters.mode = Some(op),
                    Some(prev) if prev != op => {
                        return Err(MedusaError::InvalidFilter {
                            reason: "the deps filter operators '=' and '~' can't be mixed"
                                .to_string(),
                        })
                    }
                    Some(_) => {}
                }
                filters.deps_incl.extend(incl);
                filters.deps_excl.extend(excl);
            }
        }

        Ok(filters)
    }

    /// Checks whether `run` passes the filters, narrowing its dynamic
    /// option pools where exclusions or `deps=` inclusions require it.
    ///
    /// Returns false when the run must be dropped.
    pub fn match_and_narrow(&self, run: &mut Run) -> bool {
        if !self.active {
            return true;
        }

        if self.stage_excl.contains(&run.stage) {
            return false;
        }
        if !self.stage_incl.is_empty() && !self.stage_incl.contains(&run.stage) {
            return false;
        }

        if !self.deps_excl.is_empty() {
            if run.deps.statics.iter().any(|d| self.deps_excl.contains(d)) {
                return false;
            }
            for choice in &mut run.deps.dynamics {
                choice.options.retain(|o| !self.deps_excl.contains(o));
                if choice.options.is_empty() {
                    return false;
                }
            }
        }

        match self.mode {
            Some(DepsOp::Only) if !self.deps_incl.is_empty() => {
                if !run.deps.statics.iter().all(|d| self.deps_incl.contains(d)) {
                    return false;
                }
                for choice in &mut run.deps.dynamics {
                    choice.options.retain(|o| self.deps_incl.contains(o));
                    if choice.options.is_empty() {
                        return false;
                    }
                }
                // Narrowed pools may no longer be jointly bindable.
                if run.deps.bind_greedy(&HashSet::new()).is_none() {
                    return false;
                }
            }
            Some(DepsOp::Any) if !self.deps_incl.is_empty() => {
                // Matched against static deps only; matching dynamic
                // options would pull in nearly every suite.
                if !run.deps.statics.iter().any(|d| self.deps_incl.contains(d)) {
                    return false;
                }
            }
            _ => {}
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{DepSpec, DynChoice};
    use std::path::PathBuf;

    fn run(stage: &str, statics: &[&str], dynamics: &[(&str, &[&str])]) -> Run {
        let dynamics: Vec<DynChoice> = dynamics
            .iter()
            .map(|(var, opts)| DynChoice {
                var: var.to_string(),
                options: opts.iter().map(|o| o.to_string()).collect(),
            })
            .collect();
        let n = dynamics.len();
        Run {
            suite: "demo".to_string(),
            source: PathBuf::from("demo.robot"),
            index: 0,
            expanded: false,
            stage: stage.to_string(),
            deps: DepSpec {
                statics: statics.iter().map(|s| s.to_string()).collect(),
                dynamics,
            },
            timeout: None,
            for_bindings: Vec::new(),
            dyn_values: vec![None; n],
            n_tests: 1,
            tags: Vec::new(),
        }
    }

    fn filters(args: &[&str]) -> Filters {
        Filters::parse(&args.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_no_filters_match_everything() {
        let f = Filters::parse(&[]).unwrap();
        assert!(f.match_and_narrow(&mut run("any", &["x"], &[])));
    }

    #[test]
    fn test_stage_include_and_exclude() {
        let f = filters(&["stage=first,second"]);
        assert!(f.match_and_narrow(&mut run("first", &[], &[])));
        assert!(!f.match_and_narrow(&mut run("third", &[], &[])));

        let f = filters(&["stage=!first"]);
        assert!(!f.match_and_narrow(&mut run("first", &[], &[])));
        assert!(f.match_and_narrow(&mut run("third", &[], &[])));
    }

    #[test]
    fn test_stage_rejects_tilde_operator() {
        assert!(Filters::parse(&["stage~first".to_string()]).is_err());
    }

    #[test]
    fn test_deps_exclusion_drops_and_narrows() {
        let f = filters(&["deps=!two,!three"]);
        assert!(!f.match_and_narrow(&mut run("0", &["one", "two"], &[])));
        assert!(f.match_and_narrow(&mut run("0", &["one"], &[])));

        // Excluded options are trimmed from dynamic pools.
        let mut narrowed = run("0", &[], &[("X", &["two", "four"])]);
        assert!(f.match_and_narrow(&mut narrowed));
        assert_eq!(narrowed.deps.dynamics[0].options, vec!["four"]);

        // An emptied pool drops the run.
        let mut emptied = run("0", &[], &[("X", &["two", "three"])]);
        assert!(!f.match_and_narrow(&mut emptied));
    }

    #[test]
    fn test_deps_only_requires_subset() {
        let f = filters(&["deps=one,two"]);
        assert!(f.match_and_narrow(&mut run("0", &["one"], &[])));
        assert!(f.match_and_narrow(&mut run("0", &["one", "two"], &[])));
        assert!(!f.match_and_narrow(&mut run("0", &["one", "other"], &[])));
    }

    #[test]
    fn test_deps_only_narrows_dynamics_and_checks_feasibility() {
        let f = filters(&["deps=one"]);
        let mut ok = run("0", &[], &[("X", &["one", "other"])]);
        assert!(f.match_and_narrow(&mut ok));
        assert_eq!(ok.deps.dynamics[0].options, vec!["one"]);

        // Both pools collapse onto the same single option; no joint
        // binding exists.
        let mut clash = run("0", &[], &[("X", &["one", "a"]), ("Y", &["one", "b"])]);
        assert!(!f.match_and_narrow(&mut clash));
    }

    #[test]
    fn test_deps_any_matches_static_overlap() {
        let f = filters(&["deps~one,two"]);
        assert!(f.match_and_narrow(&mut run("0", &["one", "extra"], &[])));
        assert!(!f.match_and_narrow(&mut run("0", &["extra"], &[])));
    }

    #[test]
    fn test_mixed_deps_operators_rejected() {
        assert!(Filters::parse(&["deps=one".to_string(), "deps~two".to_string()]).is_err());
    }

    #[test]
    fn test_invalid_expressions_rejected() {
        for arg in ["bogus=x", "deps=bad value", "deps="] {
            assert!(Filters::parse(&[arg.to_string()]).is_err(), "{arg}");
        }
    }
}
