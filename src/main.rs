//! kola-harness - hierarchical parallel test harness
//!
//! Runs a small demonstration suite through the harness and maps the suite
//! outcome to the process exit code.
//!
//! ## Usage
//!
//! ```bash
//! # Run everything, printing each test as it starts and ends
//! kola-harness run -v
//!
//! # Only the network checks, two at a time, aborting after a minute
//! kola-harness run --run network --parallel 2 --timeout 60
//!
//! # Show which tests a pattern selects
//! kola-harness list --run 'boot|network'
//!
//! # Write a default options file
//! kola-harness config init
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use kola_harness::cli::{self, Args, ConfigAction};
use kola_harness::config::{env::print_env_help, EnvConfig, Options};
use kola_harness::error::HarnessError;
use kola_harness::harness::{Matcher, Suite, Test};
use kola_harness::output::{OutputFormat, ResultFormatter};
use kola_harness::reporters::Collector;
use kola_harness::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(LogLevel::parse(&args.log_level).unwrap_or(LogLevel::Warn));

    match args.command {
        cli::Command::Run(run_args) => {
            let code = run_suite(run_args).await?;
            std::process::exit(code);
        }
        cli::Command::List(list_args) => {
            list_tests(list_args)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args)?;
        }
    }

    Ok(())
}

/// Options from file, then environment, then command line.
fn load_options(config: Option<&Path>) -> Result<Options> {
    let mut opts = match config {
        Some(path) => Options::load(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => Options::default(),
    };

    let env = EnvConfig::load();
    if env.has_any() {
        debug!("Applying environment overrides: {:?}", env);
        env.apply(&mut opts);
    }

    Ok(opts)
}

async fn run_suite(args: cli::RunArgs) -> Result<i32> {
    let mut opts = load_options(args.config.as_deref())?;
    args.harness.apply(&mut opts);

    let format = match args.format.as_str() {
        "none" => None,
        other => Some(
            OutputFormat::from_str(other)
                .ok_or_else(|| anyhow::anyhow!("Unknown output format: {other}"))?,
        ),
    };

    let collector = Collector::new();
    let suite = Suite::new(opts, demo_tests())?.with_reporter(collector.clone());

    info!("Starting suite with {} top-level tests", suite.tests().len());

    match suite.run().await {
        Ok(outcome) => {
            if let Some(format) = format {
                let formatter = ResultFormatter::new(format);
                println!("{}", formatter.format_summary(&collector.summary(), outcome));
            } else {
                println!("{outcome}");
            }
            Ok(outcome.exit_code())
        }
        Err(err) => {
            eprintln!("harness: {err}");
            if let HarnessError::TimedOut { dump, .. } = &err {
                eprint!("{dump}");
            }
            Ok(err.exit_code())
        }
    }
}

fn list_tests(args: cli::ListArgs) -> Result<()> {
    let matcher = Matcher::new(args.pattern.as_deref().unwrap_or(""))?;

    println!("Top-level tests:");
    println!("────────────────────────────────────────");
    for test in demo_tests() {
        let (name, selected) = matcher.full_name("", test.name());
        if selected {
            match test.timeout() {
                Some(limit) => println!("  {name} (timeout {}s)", limit.as_secs()),
                None => println!("  {name}"),
            }
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    output.display()
                );
            }

            let opts = Options {
                parallel: 4,
                timeout_secs: Some(3600),
                output_dir: Some("_kola_temp".into()),
                ..Default::default()
            };
            opts.save(&output)?;
            println!("✓ Configuration file created: {}", output.display());
        }

        ConfigAction::Show { config, format } => {
            let opts = load_options(config.as_deref())?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&opts)?
            } else {
                serde_yaml::to_string(&opts)?
            };
            println!("{output}");
        }

        ConfigAction::Env => print_env_help(),
    }

    Ok(())
}

/// Tests run by the `run` command.
fn demo_tests() -> Vec<Test> {
    vec![
        Test::new("boot", |h| async move {
            for stage in ["firmware", "kernel", "userspace"] {
                h.run(stage, |h| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    h.log("reached target");
                })
                .await;
            }
        }),
        Test::new("network", |h| async move {
            h.log("bringing up interfaces");
            for check in ["dns", "ntp", "http", "ssh"] {
                h.run(check, move |h| async move {
                    h.parallel().await;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    h.log(format!("{check} reachable"));
                })
                .await;
            }
        })
        .with_timeout(Duration::from_secs(30)),
        Test::new("storage", |h| async move {
            h.run("raid", |h| async move {
                h.skip("no spare disks on this machine");
            })
            .await;
            h.run("ext4", |h| async move {
                h.parallel().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
            .await;
        }),
        Test::new("console", |h| async move {
            h.parallel().await;
            tokio::time::sleep(Duration::from_millis(30)).await;
            h.log("no kernel warnings on console");
        }),
    ]
}
