//! Variable values and reference resolution.
//!
//! Suite variable tables are dynamically typed: a name maps to a scalar
//! string, an ordered list, a string-to-string dictionary, or the
//! explicit `${None}` sentinel ([`Value::Unbound`]). Metadata values may
//! reference table entries with `${NAME}` (any kind), `@{NAME}` (list
//! only) or `&{NAME}` (dictionary only); a bare `$NAME` is accepted as
//! shorthand for `${NAME}`.
//!
//! Resolution is pure: functions take a token and a table and return a
//! new [`Value`] without mutating either. Resolving the same token twice
//! therefore yields identical results, which the run expander relies on
//! when it re-resolves metadata under a per-iteration overlay.

use std::collections::HashMap;

use crate::error::{MedusaError, Result};

/// A resolved variable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Declared as `${None}`; placeholder for `medusa:for` targets and
    /// dynamic-dependency variables.
    Unbound,
    Scalar(String),
    List(Vec<Value>),
    /// Ordered key/value pairs; order matters for `medusa:for` and for
    /// flattening.
    Dict(Vec<(String, String)>),
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Value {
        Value::Scalar(s.into())
    }
}

/// Which sigil a reference was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sigil {
    Scalar,
    List,
    Dict,
}

/// Parses a token that consists of exactly one variable reference.
///
/// Returns the sigil and the bare variable name, or `None` if the token
/// is not a lone reference (it may still contain embedded `${...}`
/// references, which [`replace_refs`] handles).
pub fn parse_ref(token: &str) -> Option<(Sigil, &str)> {
    let (sigil, rest) = match *token.as_bytes().first()? {
        b'$' => (Sigil::Scalar, &token[1..]),
        b'@' => (Sigil::List, &token[1..]),
        b'&' => (Sigil::Dict, &token[1..]),
        _ => return None,
    };

    if let Some(name) = rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        if !name.is_empty() && !name.contains(['{', '}']) {
            return Some((sigil, name));
        }
        return None;
    }

    // Bare `$NAME` shorthand (scalar only).
    if sigil == Sigil::Scalar
        && !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Some((Sigil::Scalar, rest));
    }

    None
}

/// A suite's variable table.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    vars: HashMap<String, Value>,
}

impl VarTable {
    pub fn new() -> VarTable {
        VarTable::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Returns a copy of this table with scalar `bindings` laid on top,
    /// shadowing any declared values. Used by the run expander to
    /// re-resolve metadata under `medusa:for` assignments.
    pub fn with_overlay<'a, I>(&self, bindings: I) -> VarTable
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut table = self.clone();
        for (name, value) in bindings {
            table.set(name, Value::scalar(value));
        }
        table
    }
}

/// Resolves one whole token against the table.
///
/// A token that is a single reference yields the referenced value (with
/// the sigil constraining the kind); `${42}`-style number literals
/// normalize to their decimal string; anything else goes through inline
/// substitution and yields a scalar.
pub fn resolve_token(token: &str, table: &VarTable) -> Result<Value> {
    if let Some((sigil, name)) = parse_ref(token) {
        let value = match table.get(name) {
            Some(v) => v.clone(),
            None => match number_literal(name) {
                Some(n) if sigil == Sigil::Scalar => return Ok(Value::Scalar(n)),
                _ => {
                    return Err(MedusaError::UnresolvedReference {
                        name: token.to_string(),
                    })
                }
            },
        };

        return match (sigil, &value) {
            (Sigil::Scalar, _) => Ok(value),
            (Sigil::List, Value::List(_)) => Ok(value),
            (Sigil::Dict, Value::Dict(_)) => Ok(value),
            (Sigil::List, _) => Err(MedusaError::TypeMismatch {
                name: name.to_string(),
                expected: "list",
            }),
            (Sigil::Dict, _) => Err(MedusaError::TypeMismatch {
                name: name.to_string(),
                expected: "dictionary",
            }),
        };
    }

    Ok(Value::Scalar(replace_refs(token, table)?))
}

/// Substitutes embedded `${NAME}` references inside `s`.
///
/// Only scalar-valued (or number-literal) references are legal inline;
/// a list or dictionary cannot be spliced into the middle of a string.
pub fn replace_refs(s: &str, table: &VarTable) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference; keep the remainder literal.
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];

        match table.get(name) {
            Some(Value::Scalar(v)) => out.push_str(v),
            Some(Value::Unbound) | None => match number_literal(name) {
                Some(n) => out.push_str(&n),
                None => {
                    return Err(MedusaError::UnresolvedReference {
                        name: format!("${{{name}}}"),
                    })
                }
            },
            Some(_) => {
                return Err(MedusaError::TypeMismatch {
                    name: name.to_string(),
                    expected: "scalar",
                })
            }
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Flattens a resolved value into its element strings for use inside a
/// metadata entry: scalars pass through, lists contribute each element,
/// dictionaries contribute their values in declared order.
pub fn flatten(value: &Value, name: &str) -> Result<Vec<String>> {
    match value {
        Value::Scalar(s) => Ok(vec![s.clone()]),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Scalar(s) => out.push(s.clone()),
                    _ => {
                        return Err(MedusaError::TypeMismatch {
                            name: name.to_string(),
                            expected: "list of scalars",
                        })
                    }
                }
            }
            Ok(out)
        }
        Value::Dict(pairs) => Ok(pairs.iter().map(|(_, v)| v.clone()).collect()),
        Value::Unbound => Err(MedusaError::UnresolvedReference {
            name: name.to_string(),
        }),
    }
}

/// `${42}`-style literals resolve to their decimal form even without a
/// table entry.
fn number_literal(name: &str) -> Option<String> {
    name.parse::<i64>().ok().map(|n| n.to_string())
}
