//! Run expansion.
//!
//! Turns one [`ParsedSuite`] into its [`Run`]s. Without `medusa:for` a
//! suite yields exactly one run. With it, the source value is iterated
//! and every iteration produces a run whose stage, dependencies and
//! timeout are resolved *again* with the iteration's target bindings
//! laid over the suite's variable table — deps and stage may therefore
//! differ between sibling runs of one suite.
//!
//! Dependency entries are handled in two passes, mirroring how values
//! nest: first every token that is a lone variable reference is resolved
//! and flattened into candidate strings, then each candidate is either
//! recognized structurally as `ANY <var> IN <list>` (a dynamic choice)
//! or resolved inline into a static token.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MedusaError, Result};
use crate::metadata::{split_args, Timeout, DEPS_KEY, FOR_KEY, STAGE_KEY, TIMEOUT_KEY};
use crate::settings::is_valid_meta_name;
use crate::suite::{DepSpec, DynChoice, ParsedSuite, Run};
use crate::value::{flatten, parse_ref, replace_refs, resolve_token, Sigil, Value, VarTable};

static DYN_DEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ANY (.+) [iI][nN] (.+)$").unwrap());

/// Expands a suite into its runs. Any error is tagged with the suite's
/// source path so the caller can report and skip just this suite.
pub fn expand_suite(suite: &ParsedSuite) -> Result<Vec<Run>> {
    expand_inner(suite).map_err(|e| e.in_suite(&suite.source))
}

fn expand_inner(suite: &ParsedSuite) -> Result<Vec<Run>> {
    suite.metadata.check_known_keys()?;

    // Both are mandatory; check before expansion so a bad suite is
    // rejected even when its for-clause is also broken.
    suite.metadata.required(STAGE_KEY)?;
    if suite.metadata.all(DEPS_KEY).is_empty() {
        return Err(MedusaError::MetadataMissing {
            key: DEPS_KEY.to_string(),
        });
    }

    let for_entry = suite.metadata.single(FOR_KEY)?;
    let iterations = match for_entry {
        Some(entry) => expand_for(entry, &suite.variables)?,
        None => vec![Vec::new()],
    };

    let mut runs = Vec::with_capacity(iterations.len());
    for (index, bindings) in iterations.into_iter().enumerate() {
        let table = suite
            .variables
            .with_overlay(bindings.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let stage = resolve_stage(suite.metadata.required(STAGE_KEY)?, &table)?;
        let timeout = match suite.metadata.single(TIMEOUT_KEY)? {
            Some(raw) => Some(resolve_timeout(raw, &table)?),
            None => None,
        };
        let deps = resolve_deps(&suite.metadata.all(DEPS_KEY), &table, &suite.variables)?;

        let dyn_count = deps.dynamics.len();
        runs.push(Run {
            suite: suite.name.clone(),
            source: suite.source.clone(),
            index,
            expanded: for_entry.is_some(),
            stage,
            deps,
            timeout,
            for_bindings: bindings,
            dyn_values: vec![None; dyn_count],
            n_tests: suite.n_tests,
            tags: suite.tags.clone(),
        });
    }

    Ok(runs)
}

/// Parses and evaluates `medusa:for`, returning one binding list per
/// iteration.
fn expand_for(entry: &str, table: &VarTable) -> Result<Vec<Vec<(String, String)>>> {
    let args = split_args(entry);
    if args.len() < 3 {
        return Err(MedusaError::malformed(
            FOR_KEY,
            "expected '$TARGET [$TARGET...] IN $SOURCE'",
        ));
    }
    if !args[args.len() - 2].eq_ignore_ascii_case("IN") {
        return Err(MedusaError::malformed(
            FOR_KEY,
            "separator 'IN' not found before the source variable",
        ));
    }

    let mut targets = Vec::with_capacity(args.len() - 2);
    for tok in &args[..args.len() - 2] {
        let name = match parse_ref(tok) {
            Some((Sigil::Scalar, name)) => name,
            _ => {
                return Err(MedusaError::malformed(
                    FOR_KEY,
                    format!("target '{tok}' is not a scalar variable reference"),
                ))
            }
        };
        match table.get(name) {
            None => {
                return Err(MedusaError::malformed(
                    FOR_KEY,
                    format!("target variable '{tok}' must be declared with value ${{None}}"),
                ))
            }
            Some(Value::Unbound) => {}
            Some(value) => {
                return Err(MedusaError::TargetNotNone {
                    var: name.to_string(),
                    value: describe(value),
                })
            }
        }
        targets.push(name.to_string());
    }

    let source_tok = &args[args.len() - 1];
    let source = resolve_token(source_tok, table)?;

    match source {
        Value::Dict(pairs) => {
            if targets.len() != 2 {
                return Err(MedusaError::malformed(
                    FOR_KEY,
                    format!(
                        "a mapping source binds exactly 2 targets but {} were given",
                        targets.len()
                    ),
                ));
            }
            Ok(pairs
                .into_iter()
                .map(|(k, v)| vec![(targets[0].clone(), k), (targets[1].clone(), v)])
                .collect())
        }
        Value::List(items) => {
            let mut iterations = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                iterations.push(bind_item(&targets, item, i + 1)?);
            }
            Ok(iterations)
        }
        Value::Scalar(_) | Value::Unbound => Err(MedusaError::malformed(
            FOR_KEY,
            format!("source variable '{source_tok}' is unset or not iterable"),
        )),
    }
}

/// Binds one source item to the target variables.
fn bind_item(targets: &[String], item: Value, item_no: usize) -> Result<Vec<(String, String)>> {
    let arity_err = || MedusaError::ForArityMismatch {
        item: item_no,
        targets: targets.len(),
    };

    match item {
        Value::Scalar(s) if targets.len() == 1 => Ok(vec![(targets[0].clone(), s)]),
        Value::List(elems) => {
            if elems.len() != targets.len() {
                return Err(arity_err());
            }
            let mut bound = Vec::with_capacity(targets.len());
            for (target, elem) in targets.iter().zip(elems) {
                match elem {
                    Value::Scalar(s) => bound.push((target.clone(), s)),
                    _ => return Err(arity_err()),
                }
            }
            Ok(bound)
        }
        Value::Dict(pairs) if targets.len() == 2 && pairs.len() == 1 => {
            let (k, v) = pairs.into_iter().next().unwrap();
            Ok(vec![(targets[0].clone(), k), (targets[1].clone(), v)])
        }
        _ => Err(arity_err()),
    }
}

/// Resolves `medusa:stage` to its final name.
fn resolve_stage(raw: &str, table: &VarTable) -> Result<String> {
    let tokens = split_args(raw);
    if tokens.len() != 1 {
        return Err(MedusaError::malformed(
            STAGE_KEY,
            "expected a single stage name",
        ));
    }

    let stage = match resolve_token(&tokens[0], table)? {
        Value::Scalar(s) => s,
        other => {
            return Err(MedusaError::malformed(
                STAGE_KEY,
                format!("stage must resolve to a single value, got a {}", describe(&other)),
            ))
        }
    };

    if !is_valid_meta_name(&stage) {
        return Err(MedusaError::malformed(
            STAGE_KEY,
            format!("invalid characters in stage name '{stage}'"),
        ));
    }
    Ok(stage)
}

fn resolve_timeout(raw: &str, table: &VarTable) -> Result<Timeout> {
    let resolved = replace_refs(raw.trim(), table)?;
    Timeout::parse(&resolved)
}

/// Partitions resolved dependency entries into static tokens and
/// dynamic choices.
fn resolve_deps(entries: &[&str], table: &VarTable, declared: &VarTable) -> Result<DepSpec> {
    // Pass one: lone-reference tokens are resolved and flattened so list
    // and dictionary deps contribute their elements; everything else
    // stays raw for structural matching below.
    let mut candidates: Vec<String> = Vec::new();
    for entry in entries {
        for token in split_args(entry) {
            if parse_ref(&token).is_some() {
                let value = resolve_token(&token, table)?;
                candidates.extend(flatten(&value, &token)?);
            } else {
                candidates.push(token);
            }
        }
    }

    let mut spec = DepSpec::default();
    for candidate in candidates {
        if let Some(caps) = DYN_DEP_RE.captures(&candidate) {
            let choice = resolve_dynamic(&caps[1], &caps[2], table, declared)?;
            if spec.dynamics.iter().any(|d| d.var == choice.var) {
                return Err(MedusaError::malformed(
                    DEPS_KEY,
                    format!("duplicate dynamic dependency variable '{}'", choice.var),
                ));
            }
            spec.dynamics.push(choice);
        } else {
            let dep = replace_refs(&candidate, table)?;
            if !is_valid_meta_name(&dep) {
                return Err(MedusaError::malformed(
                    DEPS_KEY,
                    format!("invalid characters in dependency '{dep}'"),
                ));
            }
            if !spec.statics.contains(&dep) {
                spec.statics.push(dep);
            }
        }
    }

    // A dynamic choice never picks one of its own run's static deps, so
    // those options are dead; a pool with nothing left can never bind.
    for choice in &mut spec.dynamics {
        choice.options.retain(|o| !spec.statics.contains(o));
        if choice.options.is_empty() {
            return Err(MedusaError::malformed(
                DEPS_KEY,
                format!(
                    "dynamic dependency '{}' is impossible to satisfy, \
                     no options or all options are taken by static deps",
                    choice.var
                ),
            ));
        }
    }

    Ok(spec)
}

/// Evaluates one `ANY <var> IN <list>` occurrence.
fn resolve_dynamic(
    var_tok: &str,
    list_tok: &str,
    table: &VarTable,
    declared: &VarTable,
) -> Result<DynChoice> {
    let var = match parse_ref(var_tok) {
        Some((Sigil::Scalar, name)) => name,
        _ => {
            return Err(MedusaError::malformed(
                DEPS_KEY,
                format!("dynamic dependency target '{var_tok}' is not a scalar variable reference"),
            ))
        }
    };

    // Checked against the suite's *declared* table: a `medusa:for`
    // overlay may legitimately feed the slot, but a variable declared
    // with a real value is a user error.
    match declared.get(var) {
        None => {
            return Err(MedusaError::malformed(
                DEPS_KEY,
                format!("dynamic dependency variable '{var_tok}' must be declared with value ${{None}}"),
            ))
        }
        Some(Value::Unbound) => {}
        Some(value) => {
            return Err(MedusaError::TargetNotNone {
                var: var.to_string(),
                value: describe(value),
            })
        }
    }

    let options_value = resolve_token(list_tok, table)?;
    let raw_options = match &options_value {
        Value::List(_) => flatten(&options_value, list_tok)?,
        _ => {
            return Err(MedusaError::TypeMismatch {
                name: list_tok.to_string(),
                expected: "list",
            })
        }
    };

    let mut options: Vec<String> = Vec::with_capacity(raw_options.len());
    for opt in raw_options {
        if !is_valid_meta_name(&opt) {
            return Err(MedusaError::malformed(
                DEPS_KEY,
                format!("invalid characters in dependency option '{opt}'"),
            ));
        }
        if !options.contains(&opt) {
            options.push(opt);
        }
    }
    if options.is_empty() {
        return Err(MedusaError::malformed(
            DEPS_KEY,
            format!("dynamic dependency options '{list_tok}' are empty"),
        ));
    }

    Ok(DynChoice {
        var: var.to_string(),
        options,
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Unbound => "None".to_string(),
        Value::Scalar(s) => s.clone(),
        Value::List(items) => format!("list of {} items", items.len()),
        Value::Dict(pairs) => format!("dictionary of {} entries", pairs.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::RawMetadata;
    use std::path::PathBuf;

    fn list(items: &[&str]) -> Value {
        Value::List(items.iter().map(|s| Value::scalar(*s)).collect())
    }

    fn suite(meta: &[(&str, &str)], vars: VarTable) -> ParsedSuite {
        let mut metadata = RawMetadata::new();
        for (k, v) in meta {
            metadata.push(*k, *v);
        }
        ParsedSuite {
            name: "demo".to_string(),
            source: PathBuf::from("demo.robot"),
            variables: vars,
            metadata,
            n_tests: 2,
            tags: vec!["smoke".to_string()],
        }
    }

    fn base_vars() -> VarTable {
        let mut vars = VarTable::new();
        vars.set("SCALAR_STRING", Value::scalar("hello"));
        vars.set("SCALAR_NUMBER", Value::scalar("42"));
        vars.set("LIST", list(&["one", "two", "3"]));
        vars.set("STAGE", Value::scalar("Special_Stage"));
        vars.set(
            "LIST_OF_LISTS",
            Value::List(vec![
                list(&["one", "two", "three"]),
                list(&["a", "b", "c"]),
                list(&["1", "2", "3"]),
            ]),
        );
        vars.set("A", Value::Unbound);
        vars.set("B", Value::Unbound);
        vars.set("C", Value::Unbound);
        vars
    }

    #[test]
    fn test_suite_without_for_yields_one_run() {
        let s = suite(&[("medusa:stage", "0"), ("medusa:deps", "one")], VarTable::new());
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].stage, "0");
        assert_eq!(runs[0].deps.statics, vec!["one"]);
        assert!(runs[0].for_bindings.is_empty());
        assert_eq!(runs[0].name(), "demo");
    }

    #[test]
    fn test_variables_fixture_expansion() {
        // Three runs out of one suite; deps flatten scalars, numbers and
        // list elements, stage resolves through an embedded reference.
        let s = suite(
            &[
                ("medusa:stage", "my${STAGE}"),
                ("medusa:deps", "plain    ${SCALAR_STRING}    ${SCALAR_NUMBER}    @{LIST}"),
                ("medusa:for", "${A}    ${B}    ${C}    IN    ${LIST_OF_LISTS}"),
            ],
            base_vars(),
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs.len(), 3);
        for run in &runs {
            assert_eq!(run.stage, "mySpecial_Stage");
        }
        assert_eq!(runs[0].deps.statics, vec!["plain", "hello", "42", "one", "two", "3"]);
        assert_eq!(
            runs[1].for_bindings,
            vec![
                ("A".to_string(), "a".to_string()),
                ("B".to_string(), "b".to_string()),
                ("C".to_string(), "c".to_string()),
            ]
        );
        assert_eq!(runs[2].name(), "demo (3)");
    }

    #[test]
    fn test_single_target_unboxes_scalars() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("SRC", list(&["p", "q"]));
        let s = suite(
            &[
                ("medusa:stage", "0"),
                ("medusa:deps", "${X}"),
                ("medusa:for", "${X}    IN    ${SRC}"),
            ],
            vars,
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs.len(), 2);
        // Deps were re-resolved with the iteration binding overlaid.
        assert_eq!(runs[0].deps.statics, vec!["p"]);
        assert_eq!(runs[1].deps.statics, vec!["q"]);
    }

    #[test]
    fn test_dict_source_binds_key_and_value() {
        let mut vars = VarTable::new();
        vars.set("DEP", Value::Unbound);
        vars.set("SLEEP_TIME", Value::Unbound);
        vars.set(
            "RUNS",
            Value::Dict(vec![
                ("working".to_string(), "2s".to_string()),
                ("broken".to_string(), "10s".to_string()),
            ]),
        );
        let s = suite(
            &[
                ("medusa:stage", "0"),
                ("medusa:deps", "${DEP}"),
                ("medusa:for", "${DEP}    ${SLEEP_TIME}    IN    &{RUNS}"),
            ],
            vars,
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(
            runs[0].for_bindings,
            vec![
                ("DEP".to_string(), "working".to_string()),
                ("SLEEP_TIME".to_string(), "2s".to_string()),
            ]
        );
        assert_eq!(runs[1].deps.statics, vec!["broken"]);
    }

    #[test]
    fn test_dict_source_requires_two_targets() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("M", Value::Dict(vec![("k".to_string(), "v".to_string())]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "d"), ("medusa:for", "${X}    IN    &{M}")],
            vars,
        );
        assert!(expand_suite(&s).is_err());
    }

    #[test]
    fn test_for_arity_mismatch() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("Y", Value::Unbound);
        vars.set("SRC", Value::List(vec![list(&["a", "b"]), list(&["c"])]));
        let s = suite(
            &[
                ("medusa:stage", "0"),
                ("medusa:deps", "d"),
                ("medusa:for", "${X}    ${Y}    IN    ${SRC}"),
            ],
            vars,
        );
        let err = expand_suite(&s).unwrap_err();
        assert!(err.to_string().contains("item 2"), "unexpected error: {err}");
    }

    #[test]
    fn test_for_target_with_value_rejected() {
        let mut vars = VarTable::new();
        vars.set("X", Value::scalar("occupied"));
        vars.set("SRC", list(&["a"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "d"), ("medusa:for", "${X}    IN    ${SRC}")],
            vars,
        );
        let err = expand_suite(&s).unwrap_err();
        assert!(err.to_string().contains("must be declared with value"), "{err}");
    }

    #[test]
    fn test_for_undeclared_target_rejected() {
        let mut vars = VarTable::new();
        vars.set("SRC", list(&["a"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "d"), ("medusa:for", "${X}    IN    ${SRC}")],
            vars,
        );
        assert!(expand_suite(&s).is_err());
    }

    #[test]
    fn test_for_preserves_cardinality() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("SRC", list(&["a", "b", "c", "d", "e"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "d"), ("medusa:for", "${X}    IN    ${SRC}")],
            vars,
        );
        assert_eq!(expand_suite(&s).unwrap().len(), 5);
    }

    #[test]
    fn test_lowercase_in_separator() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("SRC", list(&["a"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "d"), ("medusa:for", "${X}  in  ${SRC}")],
            vars,
        );
        assert_eq!(expand_suite(&s).unwrap().len(), 1);
    }

    #[test]
    fn test_dynamic_dep_parsed_structurally() {
        let mut vars = VarTable::new();
        vars.set("PORT", Value::Unbound);
        vars.set("PORTS", list(&["12", "34", "56"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "one    ANY ${PORT} IN ${PORTS}    two")],
            vars,
        );
        let runs = expand_suite(&s).unwrap();
        let deps = &runs[0].deps;
        assert_eq!(deps.statics, vec!["one", "two"]);
        assert_eq!(deps.dynamics.len(), 1);
        assert_eq!(deps.dynamics[0].var, "PORT");
        assert_eq!(deps.dynamics[0].options, vec!["12", "34", "56"]);
    }

    #[test]
    fn test_dynamic_dep_options_pruned_by_statics() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("OPTS", list(&["one", "free"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "one    ANY ${X} IN ${OPTS}")],
            vars,
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs[0].deps.dynamics[0].options, vec!["free"]);
    }

    #[test]
    fn test_dynamic_dep_fully_pruned_is_error() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("OPTS", list(&["one"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "one    ANY ${X} IN ${OPTS}")],
            vars,
        );
        let err = expand_suite(&s).unwrap_err();
        assert!(err.to_string().contains("impossible to satisfy"), "{err}");
    }

    #[test]
    fn test_dynamic_dep_negative_shapes() {
        let cases: &[(&str, &str)] = &[
            // Target has to exist.
            ("ANY ${missing} IN ${OPTS}", "declared with value"),
            // Target has to be unbound.
            ("ANY ${bound} IN ${OPTS}", "must be declared"),
            // Source has to exist.
            ("ANY ${X} IN ${missing}", "unresolved"),
            // Source has to be a list.
            ("ANY ${X} IN ${bound}", "not a list"),
        ];
        for (deps, expect) in cases {
            let mut vars = VarTable::new();
            vars.set("X", Value::Unbound);
            vars.set("bound", Value::scalar("val"));
            vars.set("OPTS", list(&["a"]));
            let s = suite(&[("medusa:stage", "0"), ("medusa:deps", deps)], vars);
            let err = expand_suite(&s).unwrap_err();
            assert!(
                err.to_string().to_lowercase().contains(expect),
                "deps '{deps}': unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_duplicate_dynamic_variable_rejected() {
        let mut vars = VarTable::new();
        vars.set("X", Value::Unbound);
        vars.set("OPTS", list(&["a", "b"]));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "ANY ${X} IN ${OPTS}    ANY ${X} IN ${OPTS}")],
            vars,
        );
        assert!(expand_suite(&s).is_err());
    }

    #[test]
    fn test_for_supplied_dynamic_dep() {
        // The for-source feeds the deps slot with a literal ANY item,
        // which must come out as a dynamic choice, not a static token.
        let mut vars = VarTable::new();
        vars.set("D", Value::Unbound);
        vars.set("PORT", Value::Unbound);
        vars.set("PORTS", list(&["7", "8"]));
        vars.set(
            "SRC",
            Value::List(vec![Value::scalar("ANY ${PORT} IN ${PORTS}"), Value::scalar("fixed")]),
        );
        let s = suite(
            &[
                ("medusa:stage", "0"),
                ("medusa:deps", "${D}"),
                ("medusa:for", "${D}    IN    ${SRC}"),
            ],
            vars,
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].deps.statics.is_empty());
        assert_eq!(runs[0].deps.dynamics[0].options, vec!["7", "8"]);
        assert_eq!(runs[1].deps.statics, vec!["fixed"]);
        assert!(runs[1].deps.dynamics.is_empty());
    }

    #[test]
    fn test_multiple_deps_entries_accumulate() {
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "one    two"), ("medusa:deps", "three    one")],
            VarTable::new(),
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs[0].deps.statics, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_stage_re_resolved_per_iteration() {
        let mut vars = VarTable::new();
        vars.set("S", Value::Unbound);
        vars.set("SRC", list(&["first", "second"]));
        let s = suite(
            &[("medusa:stage", "${S}"), ("medusa:deps", "d"), ("medusa:for", "${S}    IN    ${SRC}")],
            vars,
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs[0].stage, "first");
        assert_eq!(runs[1].stage, "second");
    }

    #[test]
    fn test_timeout_resolved_through_variable() {
        let mut vars = VarTable::new();
        vars.set("SOFT", Value::scalar("30"));
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "d"), ("medusa:timeout", "${SOFT},60,5")],
            vars,
        );
        let runs = expand_suite(&s).unwrap();
        assert_eq!(runs[0].timeout, Some(Timeout { soft: 30, hard: 60, kill: 5 }));
    }

    #[test]
    fn test_missing_stage_or_deps_rejected() {
        let no_stage = suite(&[("medusa:deps", "d")], VarTable::new());
        assert!(matches!(
            expand_suite(&no_stage).unwrap_err(),
            MedusaError::Suite { .. }
        ));
        let no_deps = suite(&[("medusa:stage", "0")], VarTable::new());
        assert!(expand_suite(&no_deps).is_err());
    }

    #[test]
    fn test_unknown_medusa_key_rejected() {
        let s = suite(
            &[("medusa:stage", "0"), ("medusa:deps", "d"), ("medusa:retry", "3")],
            VarTable::new(),
        );
        assert!(expand_suite(&s).is_err());
    }

    #[test]
    fn test_invalid_stage_characters_rejected() {
        let s = suite(&[("medusa:stage", "bad stage"), ("medusa:deps", "d")], VarTable::new());
        assert!(expand_suite(&s).is_err());
    }
}
