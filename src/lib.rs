//! kola-harness - hierarchical parallel test harness
//!
//! Runs a tree of async tests where each test may start sequential or
//! parallel subtests. Parallel subtests wait for their parent's body to
//! finish and share one suite-wide concurrency budget. Results are written
//! as an indented report stream and handed to pluggable reporters.
//!
//! ## Modules
//!
//! - `harness` - suites, test handles, matching and admission control
//! - `config` - options from files, environment and command line
//! - `reporters` / `models` - structured results
//! - `output` - summary formatting for the command line

pub mod cli;
pub mod config;
pub mod error;
pub mod harness;
pub mod models;
pub mod output;
pub mod reporters;
pub mod utils;

pub use config::Options;
pub use error::{HarnessError, Result};
pub use harness::{Suite, SuiteOutcome, Test, H};
