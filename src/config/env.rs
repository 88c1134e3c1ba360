//! Environment variable configuration
//!
//! Provides environment variable overrides for harness options.

use std::env;
use std::path::PathBuf;

use super::Options;

/// Environment variable prefix
const ENV_PREFIX: &str = "KOLA_HARNESS";

/// Harness overrides read from the environment
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Pattern from KOLA_HARNESS_RUN
    pub pattern: Option<String>,
    /// Budget from KOLA_HARNESS_PARALLEL
    pub parallel: Option<usize>,
    /// Verbose from KOLA_HARNESS_VERBOSE
    pub verbose: Option<bool>,
    /// Watchdog seconds from KOLA_HARNESS_TIMEOUT
    pub timeout_secs: Option<u64>,
    /// Output directory from KOLA_HARNESS_OUTPUT_DIR
    pub output_dir: Option<PathBuf>,
}

impl EnvConfig {
    /// Load overrides from environment variables
    pub fn load() -> Self {
        Self {
            pattern: get_env("RUN"),
            parallel: get_env_parse("PARALLEL"),
            verbose: get_env_bool("VERBOSE"),
            timeout_secs: get_env_parse("TIMEOUT"),
            output_dir: get_env("OUTPUT_DIR").map(PathBuf::from),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.pattern.is_some()
            || self.parallel.is_some()
            || self.verbose.is_some()
            || self.timeout_secs.is_some()
            || self.output_dir.is_some()
    }

    /// Overlay the set variables onto `opts`
    pub fn apply(&self, opts: &mut Options) {
        if let Some(pattern) = &self.pattern {
            opts.pattern = pattern.clone();
        }
        if let Some(parallel) = self.parallel {
            opts.parallel = parallel;
        }
        if let Some(verbose) = self.verbose {
            opts.verbose = verbose;
        }
        if let Some(secs) = self.timeout_secs {
            opts.timeout_secs = Some(secs);
        }
        if let Some(dir) = &self.output_dir {
            opts.output_dir = Some(dir.clone());
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all KOLA_HARNESS environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_RUN         Run only tests matching a slash-separated regexp");
    println!("  {ENV_PREFIX}_PARALLEL    Run at most this many tests in parallel");
    println!("  {ENV_PREFIX}_VERBOSE     Print per-test start and end lines (true/false)");
    println!("  {ENV_PREFIX}_TIMEOUT     Abort the suite after this many seconds");
    println!("  {ENV_PREFIX}_OUTPUT_DIR  Directory for per-test output");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.pattern.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_apply_overlays_only_set_values() {
        let mut opts = Options {
            pattern: "boot".to_string(),
            parallel: 4,
            ..Default::default()
        };
        let env = EnvConfig {
            parallel: Some(2),
            verbose: Some(true),
            ..Default::default()
        };
        assert!(env.has_any());

        env.apply(&mut opts);
        assert_eq!(opts.pattern, "boot");
        assert_eq!(opts.parallel, 2);
        assert!(opts.verbose);
        assert_eq!(opts.timeout_secs, None);
    }

    #[test]
    fn test_env_bool_parsing() {
        env::set_var("KOLA_HARNESS_VERBOSE", "yes");
        env::set_var("KOLA_HARNESS_TIMEOUT", "90");
        let config = EnvConfig::load();
        env::remove_var("KOLA_HARNESS_VERBOSE");
        env::remove_var("KOLA_HARNESS_TIMEOUT");

        assert_eq!(config.verbose, Some(true));
        assert_eq!(config.timeout_secs, Some(90));
    }
}
