//! Result models for test nodes
//!
//! Defines per-node outcomes, report events and suite summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::utils::fmt_duration;

/// Final state of one test node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

impl Outcome {
    /// A failure recorded before a skip still counts as a failure.
    pub fn from_flags(failed: bool, skipped: bool) -> Self {
        if failed {
            Outcome::Fail
        } else if skipped {
            Outcome::Skip
        } else {
            Outcome::Pass
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Pass => "✓",
            Outcome::Fail => "✗",
            Outcome::Skip => "○",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Fail)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
            Outcome::Skip => write!(f, "SKIP"),
        }
    }
}

/// Event handed to reporters once a node and all its subtests are finished
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    pub outcome: Outcome,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    /// Output buffered by the node, including flushed subtest output.
    pub output: String,
}

impl NodeReport {
    /// Nesting depth; top-level tests are at depth 0.
    pub fn depth(&self) -> usize {
        self.name.matches('/').count()
    }
}

impl fmt::Display for NodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.outcome.symbol(),
            self.name,
            fmt_duration(self.duration)
        )
    }
}

/// Summary of a suite run, built from collected node reports
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration: Duration,
    pub results: Vec<NodeReport>,
}

impl SuiteSummary {
    /// Reports arrive in completion order; the summary lists them by name.
    pub fn new(mut results: Vec<NodeReport>) -> Self {
        results.sort_by(|a, b| a.name.cmp(&b.name));
        let count = |o: Outcome| results.iter().filter(|r| r.outcome == o).count();
        let passed = count(Outcome::Pass);
        let failed = count(Outcome::Fail);
        let skipped = count(Outcome::Skip);
        let total_duration = results
            .iter()
            .filter(|r| r.depth() == 0)
            .map(|r| r.duration)
            .sum();

        Self {
            total: results.len(),
            passed,
            failed,
            skipped,
            total_duration,
            results,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.results.iter().filter(|r| r.outcome == Outcome::Fail)
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {}{result}", "  ".repeat(result.depth()))?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {}",
            self.total, self.passed, self.failed, self.skipped
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}",
            self.pass_rate(),
            fmt_duration(self.total_duration)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, outcome: Outcome, ms: u64) -> NodeReport {
        NodeReport {
            name: name.to_string(),
            outcome,
            duration: Duration::from_millis(ms),
            started_at: Utc::now(),
            output: String::new(),
        }
    }

    #[test]
    fn test_outcome_from_flags() {
        assert_eq!(Outcome::from_flags(false, false), Outcome::Pass);
        assert_eq!(Outcome::from_flags(false, true), Outcome::Skip);
        assert_eq!(Outcome::from_flags(true, true), Outcome::Fail);
        assert!(Outcome::Skip.is_success());
    }

    #[test]
    fn test_report_depth() {
        assert_eq!(report("boot", Outcome::Pass, 1).depth(), 0);
        assert_eq!(report("boot/net/dns", Outcome::Pass, 1).depth(), 2);
    }

    #[test]
    fn test_suite_summary() {
        let results = vec![
            report("upgrade", Outcome::Fail, 300),
            report("boot", Outcome::Pass, 100),
            report("boot/network", Outcome::Pass, 40),
            report("upgrade/reboot", Outcome::Fail, 200),
            report("selinux", Outcome::Skip, 0),
        ];

        let summary = SuiteSummary::new(results);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total_duration, Duration::from_millis(400));
        assert_eq!(summary.results[0].name, "boot");
        assert_eq!(summary.failures().count(), 2);
        assert!(!summary.is_all_passed());
    }

    #[test]
    fn test_outcome_serializes_lowercase() {
        let json = serde_json::to_string(&Outcome::Skip).unwrap();
        assert_eq!(json, "\"skip\"");
    }
}
