//! Suite and run data model.
//!
//! A [`ParsedSuite`] is what the suite reader hands to the expander: the
//! origin path, the declared variable table and the raw metadata
//! entries. The expander turns each suite into one or more [`Run`]s —
//! the schedulable unit, carrying a fully resolved stage, dependency
//! specification and timeout plus the variable bindings for its
//! `medusa:for` iteration. Dynamic dependency values stay unbound until
//! the scheduler admits the run.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::metadata::{RawMetadata, Timeout};
use crate::value::VarTable;

/// Output of the suite reader, consumed by the expander.
#[derive(Debug, Clone)]
pub struct ParsedSuite {
    pub name: String,
    pub source: PathBuf,
    pub variables: VarTable,
    pub metadata: RawMetadata,
    /// Number of test cases in the suite.
    pub n_tests: usize,
    /// Tags attached to the suite's tests, with repetitions.
    pub tags: Vec<String>,
}

/// One dynamic dependency: the scheduler picks a single value from
/// `options` at dispatch time and binds it to `var`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynChoice {
    pub var: String,
    /// Candidate tokens in declared order; the first free one wins.
    pub options: Vec<String>,
}

/// A run's dependency specification: fixed tokens plus dynamic choices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepSpec {
    /// Static tokens in declared order, duplicates collapsed.
    pub statics: Vec<String>,
    /// Dynamic choices in declared order.
    pub dynamics: Vec<DynChoice>,
}

impl DepSpec {
    pub fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.dynamics.is_empty()
    }

    /// Attempts to bind every dynamic choice while avoiding `held`.
    ///
    /// Returns the chosen values (parallel to `dynamics`) or `None` when
    /// the run is not admissible: a static dep is held, or some choice
    /// has no free option left. Selection is greedy and deterministic —
    /// each choice takes its first option (declared order) that is
    /// neither held nor already taken by an earlier choice of the same
    /// run. No backtracking.
    pub fn bind_greedy(&self, held: &HashSet<String>) -> Option<Vec<String>> {
        if self.statics.iter().any(|d| held.contains(d)) {
            return None;
        }

        let mut chosen: Vec<String> = Vec::with_capacity(self.dynamics.len());
        for choice in &self.dynamics {
            let pick = choice
                .options
                .iter()
                .find(|o| !held.contains(o.as_str()) && !chosen.iter().any(|c| c == *o))?;
            chosen.push(pick.clone());
        }
        Some(chosen)
    }

    /// The effective dependency set given chosen dynamic values: static
    /// tokens in declared order, then the chosen values in choice order,
    /// duplicates removed.
    pub fn effective(&self, chosen: &[String]) -> Vec<String> {
        let mut deps: Vec<String> = Vec::with_capacity(self.statics.len() + chosen.len());
        for token in self.statics.iter().chain(chosen.iter()) {
            if !deps.iter().any(|d| d == token) {
                deps.push(token.clone());
            }
        }
        deps
    }
}

/// One execution of one suite with one concrete set of bindings.
///
/// A run starts out pending in its stage's queue, becomes ready the
/// moment its deps stop colliding with the in-flight set, is dispatched
/// with its dynamic values bound, and ends as a report record when its
/// child terminates.
#[derive(Debug, Clone)]
pub struct Run {
    pub suite: String,
    pub source: PathBuf,
    /// Position within the originating suite's expansion.
    pub index: usize,
    /// True when the suite was multiplied by `medusa:for`.
    pub expanded: bool,
    pub stage: String,
    pub deps: DepSpec,
    pub timeout: Option<Timeout>,
    /// `medusa:for` target assignments for this iteration, in target
    /// order.
    pub for_bindings: Vec<(String, String)>,
    /// Chosen dynamic values, parallel to `deps.dynamics`; `None` until
    /// the scheduler binds them at dispatch.
    pub dyn_values: Vec<Option<String>>,
    pub n_tests: usize,
    pub tags: Vec<String>,
}

impl Run {
    /// Display name; expanded runs get their iteration index appended so
    /// sibling runs of one suite stay distinguishable in results.
    pub fn name(&self) -> String {
        if self.expanded {
            format!("{} ({})", self.suite, self.index + 1)
        } else {
            self.suite.clone()
        }
    }

    /// All variable bindings this run injects into the child, for-targets
    /// first, then dynamic-dependency variables (unbound ones skipped).
    pub fn bindings(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self.for_bindings.clone();
        for (choice, value) in self.deps.dynamics.iter().zip(&self.dyn_values) {
            if let Some(v) = value {
                out.push((choice.var.clone(), v.clone()));
            }
        }
        out
    }

    /// Records the scheduler's dynamic choices. `values` must be
    /// parallel to `deps.dynamics`.
    pub fn bind_dynamic(&mut self, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.deps.dynamics.len());
        self.dyn_values = values.into_iter().map(Some).collect();
    }

    /// Effective dependency set; before dynamic binding this is just the
    /// static part plus whatever has been bound so far.
    pub fn effective_deps(&self) -> Vec<String> {
        let chosen: Vec<String> = self.dyn_values.iter().flatten().cloned().collect();
        self.deps.effective(&chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(statics: &[&str], dynamics: Vec<DynChoice>) -> Run {
        let n = dynamics.len();
        Run {
            suite: "demo".to_string(),
            source: PathBuf::from("demo.robot"),
            index: 0,
            expanded: false,
            stage: "0".to_string(),
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

    fn held(tokens: &[&str]) -> HashSet<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bind_greedy_picks_first_free_option() {
        let spec = DepSpec {
            statics: Vec::new(),
            dynamics: vec![DynChoice {
                var: "X".to_string(),
                options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            }],
        };
        assert_eq!(spec.bind_greedy(&held(&[])), Some(vec!["a".to_string()]));
        assert_eq!(spec.bind_greedy(&held(&["a"])), Some(vec!["b".to_string()]));
        assert_eq!(spec.bind_greedy(&held(&["a", "b", "c"])), None);
    }

    #[test]
    fn test_bind_greedy_blocked_by_held_static() {
        let spec = DepSpec {
            statics: vec!["one".to_string()],
            dynamics: Vec::new(),
        };
        assert!(spec.bind_greedy(&held(&["one"])).is_none());
        assert!(spec.bind_greedy(&held(&["other"])).is_some());
    }

    #[test]
    fn test_bind_greedy_empty_spec_always_admissible() {
        let spec = DepSpec::default();
        assert_eq!(spec.bind_greedy(&held(&["anything"])), Some(Vec::new()));
    }

    #[test]
    fn test_bind_greedy_distinct_within_run() {
        let spec = DepSpec {
            statics: Vec::new(),
            dynamics: vec![
                DynChoice {
                    var: "X".to_string(),
                    options: vec!["a".to_string(), "b".to_string()],
                },
                DynChoice {
                    var: "Y".to_string(),
                    options: vec!["a".to_string(), "b".to_string()],
                },
            ],
        };
        assert_eq!(
            spec.bind_greedy(&held(&[])),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        // Overlapping single-option pools can never bind together.
        let clash = DepSpec {
            statics: Vec::new(),
            dynamics: vec![
                DynChoice { var: "X".to_string(), options: vec!["a".to_string()] },
                DynChoice { var: "Y".to_string(), options: vec!["a".to_string()] },
            ],
        };
        assert!(clash.bind_greedy(&held(&[])).is_none());
    }

    #[test]
    fn test_effective_deps_order_and_dedup() {
        let spec = DepSpec {
            statics: vec!["a".to_string(), "b".to_string()],
            dynamics: vec![
                DynChoice { var: "X".to_string(), options: vec!["b".to_string(), "c".to_string()] },
                DynChoice { var: "Y".to_string(), options: vec!["d".to_string()] },
            ],
        };
        let eff = spec.effective(&["b".to_string(), "d".to_string()]);
        assert_eq!(eff, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_run_name_with_expansion_index() {
        let mut run = run_with(&["a"], Vec::new());
        assert_eq!(run.name(), "demo");
        run.expanded = true;
        run.index = 2;
        assert_eq!(run.name(), "demo (3)");
    }

    #[test]
    fn test_bindings_include_bound_dynamics_only() {
        let mut run = run_with(
            &[],
            vec![DynChoice { var: "PORT".to_string(), options: vec!["1".to_string()] }],
        );
        run.for_bindings = vec![("DEP".to_string(), "working".to_string())];
        assert_eq!(run.bindings(), vec![("DEP".to_string(), "working".to_string())]);

        run.bind_dynamic(vec!["1".to_string()]);
        assert_eq!(
            run.bindings(),
            vec![
                ("DEP".to_string(), "working".to_string()),
                ("PORT".to_string(), "1".to_string()),
            ]
        );
        assert_eq!(run.effective_deps(), vec!["1"]);
    }
}
