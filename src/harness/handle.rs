//! Test handle
//!
//! [`H`] is what a test body receives. Reporting methods (`log`, `error`,
//! `fail`) may be called from any task; `fail_now`, `skip_now` and their
//! variants leave the body by unwinding and must be called from the task
//! running the body. Subtests and `parallel` live in the runner module.

use std::fmt::Display;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use super::node::{BodyExit, Node};

/// Handle to a running test
#[derive(Clone)]
pub struct H {
    pub(crate) node: Arc<Node>,
}

impl H {
    /// Full slash-separated name of the test.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Whether the suite runs in verbose mode.
    pub fn verbose(&self) -> bool {
        self.node.shared.verbose
    }

    /// Cancellation token of this test.
    ///
    /// It is cancelled once the test and all of its subtests are done, when
    /// the test's deadline passes, or when the suite is torn down. Tasks
    /// started by the test can wait on it to know when to exit.
    pub fn context(&self) -> CancellationToken {
        self.node.token.clone()
    }

    /// Marks the test as failed but continues execution.
    pub fn fail(&self) {
        self.node.fail();
    }

    pub fn failed(&self) -> bool {
        self.node.failed()
    }

    /// Marks the test as failed and stops its body. Execution continues with
    /// the next test; other tasks started by this test keep running.
    pub fn fail_now(&self) -> ! {
        self.node.fail();
        self.node.set_finished();
        std::panic::resume_unwind(Box::new(BodyExit));
    }

    /// Records text in the test log. It is printed if the test fails or the
    /// suite is verbose.
    #[track_caller]
    pub fn log(&self, msg: impl Display) {
        self.node.log(&caller(Location::caller()), &msg.to_string());
    }

    /// Equivalent to `log` followed by `fail`.
    #[track_caller]
    pub fn error(&self, msg: impl Display) {
        self.node.log(&caller(Location::caller()), &msg.to_string());
        self.node.fail();
    }

    /// Equivalent to `log` followed by `fail_now`.
    #[track_caller]
    pub fn fatal(&self, msg: impl Display) -> ! {
        self.node.log(&caller(Location::caller()), &msg.to_string());
        self.fail_now()
    }

    /// Equivalent to `log` followed by `skip_now`.
    #[track_caller]
    pub fn skip(&self, msg: impl Display) -> ! {
        self.node.log(&caller(Location::caller()), &msg.to_string());
        self.skip_now()
    }

    /// Marks the test as skipped and stops its body. A test that failed
    /// before skipping is still reported as failed.
    pub fn skip_now(&self) -> ! {
        self.node.skip();
        self.node.set_finished();
        std::panic::resume_unwind(Box::new(BodyExit));
    }

    pub fn skipped(&self) -> bool {
        self.node.skipped()
    }

    /// Directory for this test's files: the suite output directory joined
    /// with the test name. Created on first use.
    #[track_caller]
    pub fn output_dir(&self) -> PathBuf {
        let Some(base) = &self.node.shared.output_dir else {
            self.fatal("harness: no output directory configured")
        };
        let dir = base.join(&self.node.name);
        if let Err(err) = std::fs::create_dir_all(&dir) {
            self.fatal(format!("harness: creating {}: {err}", dir.display()));
        }
        dir
    }

    /// Creates a uniquely named directory under `output_dir`. It is kept
    /// after the test so its contents can be inspected.
    #[track_caller]
    pub fn temp_dir(&self, prefix: &str) -> PathBuf {
        let parent = self.output_dir();
        match tempfile::Builder::new()
            .prefix(prefix)
            .keep(true)
            .tempdir_in(&parent)
        {
            Ok(dir) => dir.path().to_path_buf(),
            Err(err) => self.fatal(format!("harness: temp dir in {}: {err}", parent.display())),
        }
    }

    /// Creates a uniquely named file under `output_dir`. Like `temp_dir`, it
    /// outlives the test.
    #[track_caller]
    pub fn temp_file(&self, prefix: &str) -> NamedTempFile {
        let parent = self.output_dir();
        match tempfile::Builder::new()
            .prefix(prefix)
            .keep(true)
            .tempfile_in(&parent)
        {
            Ok(file) => file,
            Err(err) => self.fatal(format!("harness: temp file in {}: {err}", parent.display())),
        }
    }
}

impl std::fmt::Debug for H {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("H").field(&self.node.name).finish()
    }
}

fn caller(location: &Location<'_>) -> String {
    let file = Path::new(location.file())
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("???");
    format!("{file}:{}", location.line())
}
