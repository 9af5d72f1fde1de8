//! Raw `medusa:*` metadata handling.
//!
//! A suite's metadata is an ordered list of `(key, value)` entries; the
//! same key may appear more than once (several `medusa:deps` rows add
//! up). Values are kept raw here — they may still contain `${...}`
//! references — and are resolved later, per run, by the expander.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;

use crate::error::{MedusaError, Result};

pub const STAGE_KEY: &str = "medusa:stage";
pub const DEPS_KEY: &str = "medusa:deps";
pub const FOR_KEY: &str = "medusa:for";
pub const TIMEOUT_KEY: &str = "medusa:timeout";

const KNOWN_KEYS: [&str; 4] = [STAGE_KEY, DEPS_KEY, FOR_KEY, TIMEOUT_KEY];

static ARG_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static TIMEOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:,(\d+))?(?:,(\d+))?$").unwrap());

/// Splits a metadata value into its argument tokens. Two or more spaces
/// separate arguments; single spaces stay inside a token.
pub fn split_args(value: &str) -> Vec<String> {
    ARG_SPLIT_RE
        .split(value.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Ordered `medusa:*` metadata entries of one suite.
#[derive(Debug, Clone, Default)]
pub struct RawMetadata {
    entries: Vec<(String, String)>,
}

impl RawMetadata {
    pub fn new() -> RawMetadata {
        RawMetadata::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// All values recorded for `key`, in declaration order.
    pub fn all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// The value for a key that must appear at most once.
    pub fn single(&self, key: &str) -> Result<Option<&str>> {
        let values = self.all(key);
        match values.len() {
            0 => Ok(None),
            1 => Ok(Some(values[0])),
            n => Err(MedusaError::malformed(
                key,
                format!("expected a single entry but found {n}"),
            )),
        }
    }

    /// Like [`single`](Self::single) but the key must be present.
    pub fn required(&self, key: &str) -> Result<&str> {
        self.single(key)?.ok_or_else(|| MedusaError::MetadataMissing {
            key: key.to_string(),
        })
    }

    /// Rejects `medusa:*` keys this tool does not understand; a typo in
    /// a key would otherwise silently change scheduling behavior.
    pub fn check_known_keys(&self) -> Result<()> {
        for (key, _) in &self.entries {
            if key.starts_with("medusa:") && !KNOWN_KEYS.contains(&key.as_str()) {
                return Err(MedusaError::malformed(key, "unknown medusa metadata key"));
            }
        }
        Ok(())
    }
}

/// Suite process timeout ladder, in seconds.
///
/// `soft` and `hard` are measured from dispatch, `kill` from hard
/// expiry: with `2,5,3` the child is interrupted at t=2, force-stopped
/// at t=5 and killed at t=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeout {
    pub soft: u64,
    pub hard: u64,
    pub kill: u64,
}

/// Seconds added to `soft` when the hard value is omitted.
pub const DEFAULT_HARD_GRACE: u64 = 60;
/// Kill grace in seconds when omitted.
pub const DEFAULT_KILL: u64 = 10;

impl Timeout {
    pub fn new(soft: u64, hard: u64, kill: u64) -> Result<Timeout> {
        if soft == 0 || hard == 0 || kill == 0 {
            return Err(MedusaError::InvalidTimeout {
                value: format!("{soft},{hard},{kill}"),
                reason: "all timeout values must be greater than zero".to_string(),
            });
        }
        if soft > hard {
            return Err(MedusaError::InvalidTimeout {
                value: format!("{soft},{hard},{kill}"),
                reason: "soft timeout must not exceed the hard timeout".to_string(),
            });
        }
        Ok(Timeout { soft, hard, kill })
    }

    /// Parses `soft[,hard[,kill]]`.
    pub fn parse(value: &str) -> Result<Timeout> {
        let caps = TIMEOUT_RE
            .captures(value.trim())
            .ok_or_else(|| MedusaError::InvalidTimeout {
                value: value.to_string(),
                reason: "expected SOFT[,HARD[,KILL]] in seconds".to_string(),
            })?;

        let num = |i: usize| -> Result<Option<u64>> {
            caps.get(i)
                .map(|m| {
                    m.as_str().parse::<u64>().map_err(|_| MedusaError::InvalidTimeout {
                        value: value.to_string(),
                        reason: "timeout value out of range".to_string(),
                    })
                })
                .transpose()
        };
        // Group 1 always participates in a match; zero fails validation
        // below either way.
        let soft = num(1)?.unwrap_or(0);
        let hard = num(2)?.unwrap_or(soft.saturating_add(DEFAULT_HARD_GRACE));
        let kill = num(3)?.unwrap_or(DEFAULT_KILL);

        Timeout::new(soft, hard, kill)
    }

    pub fn soft_after(&self) -> Duration {
        Duration::from_secs(self.soft)
    }

    pub fn hard_after(&self) -> Duration {
        Duration::from_secs(self.hard)
    }

    /// Grace between the hard signal and the unconditional kill.
    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill)
    }
}
