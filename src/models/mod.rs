//! Data models for test results
//!
//! Plain data handed from the harness to reporters and formatters.

mod report;

pub use report::{NodeReport, Outcome, SuiteSummary};
