//! Suite entry point
//!
//! A [`Suite`] owns the top-level tests and the options they run under. Each
//! call to [`Suite::run`] builds a fresh root node, runs every top-level test
//! as a subtest of it and turns the root's final state into a
//! [`SuiteOutcome`].

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::handle::H;
use super::matcher::Matcher;
use super::node::{Node, Phase, Registry, Shared, Sink};
use super::runner::{self, BodyFn};
use super::scheduler::Scheduler;
use crate::config::Options;
use crate::error::{HarnessError, Result};
use crate::reporters::{Reporter, Reporters};
use crate::utils::fmt_duration;

/// Body of a top-level test.
pub type TestFn = Arc<dyn Fn(H) -> BoxFuture<'static, ()> + Send + Sync>;

/// A named top-level test
#[derive(Clone)]
pub struct Test {
    name: String,
    body: TestFn,
    timeout: Option<Duration>,
}

impl Test {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(H) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Arc::new(move |h| f(h).boxed()),
            timeout: None,
        }
    }

    /// Fails the test if its body runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn body(&self) -> BodyFn {
        let body = self.body.clone();
        Box::new(move |h| body(h))
    }
}

impl fmt::Debug for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Verdict of a suite run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteOutcome {
    Success,
    /// No test ran, either because none were registered or none matched.
    Empty,
    Failed,
}

impl SuiteOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            SuiteOutcome::Success => 0,
            SuiteOutcome::Empty | SuiteOutcome::Failed => 1,
        }
    }
}

impl fmt::Display for SuiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteOutcome::Success => write!(f, "PASS"),
            SuiteOutcome::Empty => write!(f, "no tests to run"),
            SuiteOutcome::Failed => write!(f, "FAIL"),
        }
    }
}

/// How long aborted test tasks get to unwind after a suite timeout.
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// A set of top-level tests and the options they run with
pub struct Suite {
    opts: Options,
    tests: Vec<Test>,
    matcher: Matcher,
    sink: Sink,
    reporters: Reporters,
    /// Scheduler and registry of the latest run.
    scheduler: Mutex<Arc<Scheduler>>,
    registry: Mutex<Arc<Registry>>,
}

impl Suite {
    /// Creates a suite. Fails if the run pattern does not compile.
    pub fn new(opts: Options, tests: Vec<Test>) -> Result<Self> {
        let matcher = Matcher::new(&opts.pattern)?;
        let scheduler = Arc::new(Scheduler::new(opts.max_parallel()));
        Ok(Self {
            opts,
            tests,
            matcher,
            sink: sink(std::io::stdout()),
            reporters: Reporters::new(),
            scheduler: Mutex::new(scheduler),
            registry: Mutex::new(Arc::new(Registry::default())),
        })
    }

    /// Redirects the report stream, which goes to stdout by default.
    pub fn with_output(mut self, out: impl Write + Send + 'static) -> Self {
        self.sink = sink(out);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.add(reporter);
        self
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    /// Scheduler of the latest run.
    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.lock().clone()
    }

    /// Number of test tasks that have not finished.
    pub fn live_tasks(&self) -> usize {
        self.registry.lock().len()
    }

    /// Names and phases of the tests that have not finished.
    pub fn live_tests(&self) -> Vec<(String, Phase)> {
        self.registry.lock().snapshot()
    }

    /// Runs every test and returns the verdict.
    ///
    /// Test failures are reported through the outcome. An error means the
    /// run itself could not complete: the output directory could not be
    /// prepared or the suite timeout expired. On timeout every test task is
    /// aborted before the error is returned. Panics raised by test bodies,
    /// including harness usage errors, are re-raised here.
    pub async fn run(&self) -> Result<SuiteOutcome> {
        let output_dir = match &self.opts.output_dir {
            Some(dir) => Some(clean_output_dir(dir)?),
            None => None,
        };

        let scheduler = Arc::new(Scheduler::new(self.opts.max_parallel()));
        let registry = Arc::new(Registry::default());
        *self.scheduler.lock() = scheduler.clone();
        *self.registry.lock() = registry.clone();

        let shared = Arc::new(Shared {
            matcher: self.matcher.fresh(),
            scheduler: scheduler.clone(),
            verbose: self.opts.verbose,
            sink: self.sink.clone(),
            reporters: self.reporters.clone(),
            registry: registry.clone(),
            output_dir,
        });

        // The root holds the main slot while it dispatches top-level tests.
        scheduler.occupy_main();
        let token = CancellationToken::new();
        let root = Node::root(shared, token.clone());

        let tests = self.tests.clone();
        let body: BodyFn = Box::new(move |h: H| {
            async move {
                for test in tests {
                    h.start(&test.name, test.timeout, test.body()).await;
                }
            }
            .boxed()
        });

        info!(
            "Running {} tests (max {} parallel)",
            self.tests.len(),
            scheduler.max_parallel()
        );
        let started = Instant::now();
        let mut handle = tokio::spawn(runner::drive(root.clone(), None, body));
        registry.attach(root.id, handle.abort_handle());

        let joined = match self.opts.timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let running = registry.snapshot();
                    let dump = dump(limit, &running, &scheduler);
                    error!("Suite timed out after {}", fmt_duration(limit));
                    token.cancel();
                    let tasks = registry.abort_all();
                    let stopped = tokio::time::timeout(ABORT_GRACE, async {
                        while tasks.iter().any(|task| !task.is_finished()) {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    })
                    .await;
                    if stopped.is_err() {
                        warn!("Some test tasks ignored the abort");
                    }
                    scheduler.reset();
                    return Err(HarnessError::TimedOut {
                        after: limit,
                        running: running.into_iter().map(|(name, _)| name).collect(),
                        dump,
                    });
                }
            },
            None => handle.await,
        };
        runner::propagate(joined);
        scheduler.release();

        let outcome = if !root.ran() {
            warn!("No tests to run");
            SuiteOutcome::Empty
        } else if root.failed() {
            SuiteOutcome::Failed
        } else {
            SuiteOutcome::Success
        };
        info!(
            "Suite finished: {} ({})",
            outcome,
            fmt_duration(started.elapsed())
        );
        self.reporters.finish(outcome);
        Ok(outcome)
    }

    /// Waits up to `grace` for every test task to finish.
    ///
    /// Meant to be called after `run` returns. Tasks still alive after the
    /// grace period point at a test infrastructure defect.
    pub async fn wait_idle(&self, grace: Duration) -> Result<()> {
        let registry = self.registry.lock().clone();
        let deadline = Instant::now() + grace;
        loop {
            let live = registry.len();
            if live == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                for (name, phase) in registry.snapshot() {
                    warn!("Leftover test task {} ({})", name, phase);
                }
                return Err(HarnessError::Leaked { live });
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("opts", &self.opts)
            .field("tests", &self.tests)
            .field("reporters", &self.reporters)
            .finish()
    }
}

fn sink(out: impl Write + Send + 'static) -> Sink {
    let out: Box<dyn Write + Send> = Box::new(out);
    Arc::new(Mutex::new(out))
}

/// Empties `path` and recreates it.
pub fn clean_output_dir(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() || path == Path::new(".") {
        return Err(HarnessError::NoOutputDir);
    }
    let io_err = |source| HarnessError::OutputDir {
        path: path.to_path_buf(),
        source,
    };
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(err)),
    }
    std::fs::create_dir_all(path).map_err(io_err)?;
    Ok(path.to_path_buf())
}

fn dump(after: Duration, running: &[(String, Phase)], scheduler: &Scheduler) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "harness: tests timed out after {}", fmt_duration(after));
    let _ = writeln!(out, "running tests:");
    for (name, phase) in running {
        let _ = writeln!(out, "\t{name} ({phase})");
    }
    let _ = writeln!(
        out,
        "scheduler: {} running, {} waiting (max {})",
        scheduler.running(),
        scheduler.waiting(),
        scheduler.max_parallel()
    );
    out
}
