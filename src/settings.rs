//! Run-wide settings and shared constants.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::metadata::Timeout;

/// Stage and dependency names must match this pattern. Keeping the
/// character set tight makes names safe for directory components and the
/// four-space-joined metadata string.
pub static META_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9:][a-zA-Z0-9:._-]*$").unwrap());

/// Returns true if `name` is acceptable as a stage or dependency name.
pub fn is_valid_meta_name(name: &str) -> bool {
    META_NAME_RE.is_match(name)
}

/// Settings assembled from the command line, shared by the scheduler and
/// the launcher.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Result directory; must not exist before the run starts.
    pub outputdir: PathBuf,

    /// Options forwarded verbatim to every child `robot` invocation.
    pub robot_args: Vec<String>,

    /// Default timeout for runs without their own `medusa:timeout`.
    pub timeout: Option<Timeout>,

    /// Program used to execute suites.
    pub robot_bin: String,
}

impl Settings {
    pub fn new(outputdir: PathBuf, robot_args: Vec<String>, timeout: Option<Timeout>) -> Self {
        Self {
            outputdir,
            robot_args,
            timeout,
            robot_bin: "robot".to_string(),
        }
    }
}

/// Default result directory: `results/<YYYY-MM-DD_HHMMSS>`.
pub fn default_outputdir() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
    PathBuf::from("results").join(stamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_meta_names() {
        for name in ["plain", "Special_Stage", "1_Example", "net:eth0", "a.b-c", "42"] {
            assert!(is_valid_meta_name(name), "expected '{}' to be valid", name);
        }
    }

    #[test]
    fn test_invalid_meta_names() {
        for name in ["", " lead", "has space", "-dash-first", "_under", "a/b", "x${y}"] {
            assert!(!is_valid_meta_name(name), "expected '{}' to be invalid", name);
        }
    }
}
