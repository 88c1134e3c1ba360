//! Configuration module
//!
//! Suite options, loaded from a file and environment overrides. Options are
//! fixed once handed to a [`Suite`](crate::harness::Suite).

pub mod env;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use env::EnvConfig;

/// Harness options
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Run only tests matching a slash-separated regexp
    pub pattern: String,

    /// Maximum tests executing at once (0 means available parallelism)
    pub parallel: usize,

    /// Print per-test start and end lines
    pub verbose: bool,

    /// Abort the suite after this many seconds (None or 0 means unlimited)
    pub timeout_secs: Option<u64>,

    /// Directory for per-test output and temporary files
    pub output_dir: Option<PathBuf>,
}

impl Options {
    /// Load options from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let opts: Self = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(opts)
    }

    /// Save options to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Effective concurrency budget
    pub fn max_parallel(&self) -> usize {
        if self.parallel > 0 {
            self.parallel
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Effective watchdog duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert!(opts.pattern.is_empty());
        assert!(opts.max_parallel() >= 1);
        assert_eq!(opts.timeout(), None);
    }

    #[test]
    fn test_zero_timeout_is_unlimited() {
        let opts = Options {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(opts.timeout(), None);
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        let opts = Options {
            pattern: "boot/network".to_string(),
            parallel: 3,
            verbose: true,
            timeout_secs: Some(600),
            output_dir: Some(PathBuf::from("_harness_temp")),
        };
        opts.save(&path).unwrap();
        assert_eq!(Options::load(&path).unwrap(), opts);
    }

    #[test]
    fn test_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(&path, r#"{"parallel": 8}"#).unwrap();

        let opts = Options::load(&path).unwrap();
        assert_eq!(opts.parallel, 8);
        assert!(!opts.verbose);
    }
}
