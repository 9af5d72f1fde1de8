//! Robot suite file reading.
//!
//! Medusa only needs three things from a suite file: the `Metadata` rows
//! of the `*** Settings ***` section, the `*** Variables ***` table and
//! the test-case/tag counts used by `stats`. This reader extracts
//! exactly that and leaves everything else (keywords, test bodies,
//! resource imports) to the `robot` child process that eventually
//! executes the suite.
//!
//! Cells are separated by two or more spaces, `...` rows continue the
//! previous row, `#` starts a comment. Variable declarations support
//! scalars (`${X}`), lists (`@{X}`), dictionaries (`&{X}` with `k=v`
//! cells), the `${None}` sentinel, `${42}`-style numbers and references
//! to previously declared variables — which is how nested lists such as
//! a list of lists are written.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{MedusaError, Result};
use crate::metadata::{split_args, RawMetadata};
use crate::suite::ParsedSuite;
use crate::value::{parse_ref, replace_refs, Sigil, Value, VarTable};

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*{1,3}\s*([A-Za-z ]+?)\s*\*{0,3}\s*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Settings,
    Variables,
    Tests,
    Other,
}

fn section_for(header: &str) -> Section {
    match header.trim().to_ascii_lowercase().as_str() {
        "settings" | "setting" => Section::Settings,
        "variables" | "variable" => Section::Variables,
        "test cases" | "test case" | "tasks" | "task" => Section::Tests,
        _ => Section::Other,
    }
}

/// Collects all suites under the given paths, in path order;
/// directories are walked recursively in name order so the scheduler's
/// input order is stable.
pub fn collect_suites(paths: &[PathBuf]) -> Result<Vec<ParsedSuite>> {
    let mut suites = Vec::new();
    for path in paths {
        collect_into(path, &mut suites)?;
    }
    Ok(suites)
}

fn collect_into(path: &Path, suites: &mut Vec<ParsedSuite>) -> Result<()> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|e| e.path())
            .collect();
        entries.sort();
        for entry in entries {
            collect_into(&entry, suites)?;
        }
        return Ok(());
    }

    if path.extension().is_some_and(|e| e == "robot") {
        match read_suite(path)? {
            Some(suite) => suites.push(suite),
            None => debug!("skipping '{}', no test cases", path.display()),
        }
    }
    Ok(())
}

/// Reads one suite file. Returns `None` for suites without test cases;
/// only leaf suites that actually run tests take part in scheduling.
pub fn read_suite(path: &Path) -> Result<Option<ParsedSuite>> {
    let content = std::fs::read_to_string(path)?;
    let parsed = parse_suite(&content).map_err(|e| e.in_suite(path))?;

    if parsed.n_tests == 0 {
        return Ok(None);
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Some(ParsedSuite {
        name,
        source: path.to_path_buf(),
        variables: parsed.variables,
        metadata: parsed.metadata,
        n_tests: parsed.n_tests,
        tags: parsed.tags,
    }))
}

#[derive(Debug)]
struct ParsedFile {
    variables: VarTable,
    metadata: RawMetadata,
    n_tests: usize,
    tags: Vec<String>,
}

fn parse_suite(content: &str) -> Result<ParsedFile> {
    let mut variables = VarTable::new();
    let mut metadata = RawMetadata::new();
    let mut n_tests = 0usize;
    let mut tags: Vec<String> = Vec::new();

    let mut section = Section::Other;

    for row in logical_rows(content) {
        if let Some(caps) = SECTION_RE.captures(&row.text) {
            section = section_for(&caps[1]);
            continue;
        }

        match section {
            Section::Settings => {
                let cells = split_args(&row.text);
                if cells.first().is_some_and(|c| c.eq_ignore_ascii_case("metadata")) {
                    if cells.len() < 2 {
                        return Err(MedusaError::SuiteFormat {
                            reason: "Metadata row without a name".to_string(),
                        });
                    }
                    metadata.push(cells[1].clone(), cells[2..].join("    "));
                }
            }
            Section::Variables => {
                let cells = split_args(&row.text);
                if let Some((decl, values)) = cells.split_first() {
                    let (name, value) = parse_variable(decl, values, &variables)?;
                    variables.set(name, value);
                }
            }
            Section::Tests => {
                if row.indented {
                    let cells = split_args(&row.text);
                    if cells.first().is_some_and(|c| c.eq_ignore_ascii_case("[tags]")) {
                        tags.extend(cells[1..].iter().cloned());
                    }
                } else {
                    n_tests += 1;
                }
            }
            Section::Other => {}
        }
    }

    Ok(ParsedFile {
        variables,
        metadata,
        n_tests,
        tags,
    })
}

struct Row {
    text: String,
    indented: bool,
}

/// Joins `...` continuation lines onto their parent row and drops
/// comments and blanks.
fn logical_rows(content: &str) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_end();
        let stripped = trimmed.trim_start();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        if let Some(cont) = stripped.strip_prefix("...") {
            if let Some(prev) = rows.last_mut() {
                let cont = cont.trim_start();
                if !cont.is_empty() {
                    prev.text.push_str("    ");
                    prev.text.push_str(cont);
                }
                continue;
            }
        }

        rows.push(Row {
            text: stripped.to_string(),
            indented: trimmed.starts_with(' ') || trimmed.starts_with('\t'),
        });
    }

    rows
}

/// Parses one `*** Variables ***` row into a name and its value.
///
/// References in value cells resolve against the variables declared
/// above the row, which is also how nested structures are built.
fn parse_variable(decl: &str, values: &[String], table: &VarTable) -> Result<(String, Value)> {
    let (sigil, name) = parse_ref(decl).ok_or_else(|| MedusaError::SuiteFormat {
        reason: format!("invalid variable declaration '{decl}'"),
    })?;

    let value = match sigil {
        Sigil::Scalar => match values {
            [] => Value::scalar(""),
            [single] => resolve_cell(single, table)?,
            _ => {
                return Err(MedusaError::SuiteFormat {
                    reason: format!("scalar variable '{decl}' has more than one value"),
                })
            }
        },
        Sigil::List => {
            let mut items = Vec::with_capacity(values.len());
            for cell in values {
                items.push(resolve_cell(cell, table)?);
            }
            Value::List(items)
        }
        Sigil::Dict => {
            let mut pairs = Vec::with_capacity(values.len());
            for cell in values {
                let (k, v) = cell.split_once('=').ok_or_else(|| MedusaError::SuiteFormat {
                    reason: format!("dictionary entry '{cell}' in '{decl}' is missing '='"),
                })?;
                pairs.push((k.to_string(), replace_refs(v, table)?));
            }
            Value::Dict(pairs)
        }
    };

    Ok((name.to_string(), value))
}

fn resolve_cell(cell: &str, table: &VarTable) -> Result<Value> {
    if let Some((Sigil::Scalar, name)) = parse_ref(cell) {
        if name.eq_ignore_ascii_case("none") {
            return Ok(Value::Unbound);
        }
    }
    if let Some((_, name)) = parse_ref(cell) {
        if let Some(value) = table.get(name) {
            return Ok(value.clone());
        }
    }
    Ok(Value::Scalar(replace_refs(cell, table)?))
}
