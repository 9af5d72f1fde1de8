//! Error types shared across the crate.
//!
//! Suite-level problems (bad metadata, unresolvable variables, malformed
//! `medusa:for` clauses) reject the offending suite before scheduling;
//! they never abort sibling suites. Runtime problems (spawn failures,
//! IO) surface through the same enum so callers can attach suite context
//! with [`MedusaError::in_suite`].

use std::io;
use std::path::Path;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, MedusaError>;

/// Errors raised while reading, expanding, or executing suites.
#[derive(Debug, thiserror::Error)]
pub enum MedusaError {
    /// A required `medusa:*` metadata key is absent.
    #[error("missing required metadata '{key}'")]
    MetadataMissing { key: String },

    /// A `medusa:*` metadata value does not have the expected shape.
    #[error("invalid metadata '{key}': {reason}")]
    MetadataMalformed { key: String, reason: String },

    /// A variable reference could not be resolved against the suite's
    /// variable table.
    #[error("unresolved variable reference '{name}'")]
    UnresolvedReference { name: String },

    /// A variable resolved to a value of the wrong kind (e.g. `@{X}`
    /// where `X` holds a scalar).
    #[error("variable '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// A `medusa:for` source item cannot be mapped onto the declared
    /// target variables.
    #[error("for-source item {item} cannot be bound to {targets} target variable(s)")]
    ForArityMismatch { item: usize, targets: usize },

    /// A `medusa:for` target or dynamic-dependency variable must be
    /// declared with value `${None}` but carries a real value.
    #[error("variable '{var}' must be declared with value ${{None}} but has value '{value}'")]
    TargetNotNone { var: String, value: String },

    /// A `-t/--timeout` or `medusa:timeout` value is not a valid
    /// `soft[,hard[,kill]]` triple.
    #[error("invalid timeout '{value}': {reason}")]
    InvalidTimeout { value: String, reason: String },

    /// A `-f/--filter` expression is malformed or filters conflict.
    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },

    /// An unknown value was passed to `-s/--select`.
    #[error("unknown value in selection of stats: '{value}'")]
    InvalidSelection { value: String },

    /// A suite file could not be parsed into sections, variables and
    /// metadata.
    #[error("invalid suite file: {reason}")]
    SuiteFormat { reason: String },

    /// Wraps any of the above with the suite it was raised for.
    #[error("error in suite '{suite}': {source}")]
    Suite {
        suite: String,
        #[source]
        source: Box<MedusaError>,
    },

    /// Spawning the child runner process failed.
    #[error("failed to start '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MedusaError {
    /// Attaches the originating suite path to an error, unless it is
    /// already carrying one.
    pub fn in_suite(self, source: &Path) -> MedusaError {
        match self {
            MedusaError::Suite { .. } => self,
            other => MedusaError::Suite {
                suite: source.display().to_string(),
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> MedusaError {
        MedusaError::MetadataMalformed {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
