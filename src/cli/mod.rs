//! CLI argument parsing
//!
//! [`HarnessArgs`] holds the flags any program embedding a suite accepts;
//! [`Args`] is the parser of the bundled `kola-harness` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Options;

/// Flags controlling a suite run
#[derive(clap::Args, Clone, Debug, Default)]
pub struct HarnessArgs {
    /// Run only tests matching a slash-separated regexp
    #[arg(long = "run", value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Run at most this many tests in parallel (0 = number of CPUs)
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Print per-test start and end lines
    #[arg(short, long)]
    pub verbose: bool,

    /// Abort the suite after this many seconds (0 = no limit)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory for per-test output; emptied before the run
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

impl HarnessArgs {
    /// Overlays the flags that were given onto `opts`.
    pub fn apply(&self, opts: &mut Options) {
        if let Some(pattern) = &self.pattern {
            opts.pattern = pattern.clone();
        }
        if let Some(parallel) = self.parallel {
            opts.parallel = parallel;
        }
        if self.verbose {
            opts.verbose = true;
        }
        if let Some(secs) = self.timeout {
            opts.timeout_secs = Some(secs);
        }
        if let Some(dir) = &self.output_dir {
            opts.output_dir = Some(dir.clone());
        }
    }
}

/// Hierarchical parallel test harness
#[derive(Parser, Debug)]
#[command(name = "kola-harness")]
#[command(version)]
#[command(about = "Run a tree of sequential and parallel tests")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bundled demonstration suite
    Run(RunArgs),

    /// List the top-level tests a pattern selects
    List(ListArgs),

    /// Manage harness configuration files
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub harness: HarnessArgs,

    /// Options file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Summary format printed after the run (table, json, json-pretty, summary, none)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list tests matching this pattern
    #[arg(long = "run", value_name = "PATTERN")]
    pub pattern: Option<String>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default options file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "kola-harness.yaml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Show effective options after environment overrides
    Show {
        /// Options file to start from
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// List the environment variables the harness reads
    Env,
}
