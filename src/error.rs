//! Harness errors
//!
//! Infrastructure failures of a suite run. Test failures are not errors;
//! they are reported through [`SuiteOutcome`](crate::harness::SuiteOutcome).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while configuring or running a suite
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("invalid regexp for element {index} of pattern ({pattern:?}): {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("no output directory provided")]
    NoOutputDir,

    #[error("output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("tests timed out after {after:?}; still running: {}", running.join(", "))]
    TimedOut {
        after: Duration,
        running: Vec<String>,
        dump: String,
    },

    #[error("{live} test tasks still alive after the suite finished")]
    Leaked { live: usize },
}

impl HarnessError {
    /// Process exit code for an aborted run
    pub fn exit_code(&self) -> i32 {
        2
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_out_lists_running_nodes() {
        let err = HarnessError::TimedOut {
            after: Duration::from_secs(1),
            running: vec!["slow".to_string(), "slow/inner".to_string()],
            dump: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("slow, slow/inner"));
        assert_eq!(err.exit_code(), 2);
    }
}
