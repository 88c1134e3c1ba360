//! Test node state
//!
//! One [`Node`] per test or subtest: identity, reporting state, buffered
//! output and the synchronization a parent needs to defer and release its
//! parallel subtests. Nodes are shared with their task through `Arc`; the
//! parent link is weak so a tree never keeps itself alive.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::matcher::Matcher;
use super::scheduler::Scheduler;
use crate::models::{NodeReport, Outcome};
use crate::reporters::Reporters;
use crate::utils::{fmt_duration, SplitTimer};

/// An indent of four spaces aligns the dashes of a subtest report with the
/// status of its parent.
const INDENT: &str = "    ";

/// Where a suite writes its report stream.
pub(crate) type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Lifecycle position of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Created,
    Running,
    SuspendedAtBarrier,
    SuspendedForAdmission,
    AwaitingChildren,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Created => "created",
            Phase::Running => "running",
            Phase::SuspendedAtBarrier => "waiting for parent",
            Phase::SuspendedForAdmission => "waiting for a slot",
            Phase::AwaitingChildren => "waiting for subtests",
            Phase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Unwind payload used by `fail_now` and `skip_now` to leave a test body.
pub(crate) struct BodyExit;

/// State common to every node of one suite run
pub(crate) struct Shared {
    pub matcher: Matcher,
    pub scheduler: Arc<Scheduler>,
    pub verbose: bool,
    pub sink: Sink,
    pub reporters: Reporters,
    pub registry: Arc<Registry>,
    pub output_dir: Option<PathBuf>,
}

impl Shared {
    /// Writes straight to the suite output so progress shows without delay.
    pub fn emit(&self, text: &str) {
        let mut sink = self.sink.lock();
        let _ = sink.write_all(text.as_bytes());
        let _ = sink.flush();
    }
}

/// Nodes whose tasks have not finished yet.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    live: Mutex<BTreeMap<u64, Entry>>,
    /// Set once the run is torn down; tasks attached later are aborted.
    closed: AtomicBool,
}

#[derive(Debug)]
struct Entry {
    node: Weak<Node>,
    task: Option<AbortHandle>,
}

impl Registry {
    fn insert(&self, node: &Arc<Node>) {
        self.live.lock().insert(
            node.id,
            Entry {
                node: Arc::downgrade(node),
                task: None,
            },
        );
    }

    /// Records the task running node `id`.
    pub(crate) fn attach(&self, id: u64, task: AbortHandle) {
        let mut live = self.live.lock();
        if self.closed.load(Ordering::Acquire) {
            live.remove(&id);
            task.abort();
            return;
        }
        if let Some(entry) = live.get_mut(&id) {
            entry.task = Some(task);
        }
    }

    pub(crate) fn remove(&self, id: u64) {
        self.live.lock().remove(&id);
    }

    /// Aborts every live task and forgets the nodes. Returns the handles so
    /// the caller can wait for the tasks to stop.
    pub(crate) fn abort_all(&self) -> Vec<AbortHandle> {
        let mut live = self.live.lock();
        self.closed.store(true, Ordering::Release);
        let tasks: Vec<_> = std::mem::take(&mut *live)
            .into_values()
            .filter_map(|entry| entry.task)
            .collect();
        for task in &tasks {
            task.abort();
        }
        tasks
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    /// Names and phases of live nodes, sorted by name. The root is omitted.
    pub fn snapshot(&self) -> Vec<(String, Phase)> {
        let mut nodes: Vec<_> = self
            .live
            .lock()
            .values()
            .filter_map(|entry| entry.node.upgrade())
            .filter(|n| n.level > 0)
            .map(|n| (n.name.clone(), n.phase()))
            .collect();
        nodes.sort();
        nodes
    }
}

#[derive(Debug, Default)]
struct State {
    output: String,
    /// The test, or one of its subtests, executed.
    ran: bool,
    failed: bool,
    skipped: bool,
    /// The body returned or left through `fail_now`/`skip_now`.
    finished: bool,
    /// The body and every subtest have completed.
    done: bool,
    has_sub: bool,
}

pub(crate) struct Node {
    pub id: u64,
    pub name: String,
    /// Nesting depth; 0 for the suite root.
    pub level: usize,
    parent: Option<Weak<Node>>,
    pub shared: Arc<Shared>,
    pub token: CancellationToken,
    pub started_at: DateTime<Utc>,
    state: RwLock<State>,
    phase: Mutex<Phase>,
    pub timer: Mutex<SplitTimer>,
    is_parallel: AtomicBool,
    /// Subtests that opted into parallel execution, in release order.
    pub sub: Mutex<Vec<Arc<Node>>>,
    /// Task handle of a deferred parallel subtest.
    pub task: Mutex<Option<JoinHandle<()>>>,
    /// Tells the parent's `run` call that this test went parallel.
    pub release: Mutex<Option<oneshot::Sender<()>>>,
    /// Closed once this node's body returns, freeing deferred subtests.
    pub barrier: watch::Sender<bool>,
}

impl Node {
    pub fn root(shared: Arc<Shared>, token: CancellationToken) -> Arc<Self> {
        Self::build(shared, None, String::new(), 0, token)
    }

    pub fn child(parent: &Arc<Node>, name: String) -> Arc<Self> {
        Self::build(
            parent.shared.clone(),
            Some(Arc::downgrade(parent)),
            name,
            parent.level + 1,
            parent.token.child_token(),
        )
    }

    fn build(
        shared: Arc<Shared>,
        parent: Option<Weak<Node>>,
        name: String,
        level: usize,
        token: CancellationToken,
    ) -> Arc<Self> {
        let (barrier, _) = watch::channel(false);
        let node = Arc::new(Self {
            id: shared.registry.next_id.fetch_add(1, Ordering::Relaxed),
            name,
            level,
            parent,
            shared,
            token,
            started_at: Utc::now(),
            state: RwLock::new(State::default()),
            phase: Mutex::new(Phase::Created),
            timer: Mutex::new(SplitTimer::new()),
            is_parallel: AtomicBool::new(false),
            sub: Mutex::new(Vec::new()),
            task: Mutex::new(None),
            release: Mutex::new(None),
            barrier,
        });
        node.shared.registry.insert(&node);
        node
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    pub fn is_parallel(&self) -> bool {
        self.is_parallel.load(Ordering::Acquire)
    }

    /// Marks the node parallel; false if it already was.
    pub fn mark_parallel(&self) -> bool {
        !self.is_parallel.swap(true, Ordering::AcqRel)
    }

    pub fn set_has_sub(&self) {
        self.state.write().has_sub = true;
    }

    pub fn has_sub(&self) -> bool {
        self.state.read().has_sub
    }

    pub fn ran(&self) -> bool {
        self.state.read().ran
    }

    pub fn set_ran(&self) {
        if let Some(parent) = self.parent() {
            parent.set_ran();
        }
        self.state.write().ran = true;
    }

    /// Records a failure here and on every ancestor.
    ///
    /// A failure reported after the test is done cannot reach any report,
    /// so it aborts the process.
    pub fn fail(&self) {
        if self.done() {
            self.abort_late_failure();
        }
        if let Some(parent) = self.parent() {
            parent.fail();
        }
        let mut state = self.state.write();
        // `done` is checked under the lock so late failures from stray tasks
        // are caught even while the parent is finishing.
        if state.done {
            drop(state);
            self.abort_late_failure();
        }
        state.failed = true;
    }

    fn abort_late_failure(&self) -> ! {
        let msg = format!("harness: fail in task after {} has completed", self.name);
        error!("{}", msg);
        self.shared.emit(&format!("{msg}\n"));
        eprintln!("{msg}");
        std::process::abort();
    }

    pub fn failed(&self) -> bool {
        self.state.read().failed
    }

    pub fn skip(&self) {
        self.state.write().skipped = true;
    }

    pub fn skipped(&self) -> bool {
        self.state.read().skipped
    }

    pub fn set_finished(&self) {
        self.state.write().finished = true;
    }

    pub fn finished(&self) -> bool {
        self.state.read().finished
    }

    pub fn set_done(&self) {
        self.state.write().done = true;
    }

    pub fn done(&self) -> bool {
        self.state.read().done
    }

    /// Appends a log line attributed to `location`.
    pub fn log(&self, location: &str, msg: &str) {
        let mut state = self.state.write();
        let mut lines = msg.lines();
        let first = lines.next().unwrap_or("");
        state.output.push_str(INDENT);
        state.output.push_str(location);
        state.output.push_str(": ");
        state.output.push_str(first);
        state.output.push('\n');
        for line in lines {
            state.output.push_str(INDENT);
            state.output.push_str(INDENT);
            state.output.push_str(line);
            state.output.push('\n');
        }
    }

    pub fn outcome(&self) -> Outcome {
        let state = self.state.read();
        Outcome::from_flags(state.failed, state.skipped)
    }

    /// Hands the finished node to the reporters and flushes its output to
    /// the parent. Failures are always flushed; passes and skips only in
    /// verbose mode.
    pub fn report(&self) {
        if self.parent.is_none() {
            return;
        }
        let outcome = self.outcome();
        let duration = self.timer.lock().total();
        let output = std::mem::take(&mut self.state.write().output);

        self.shared.reporters.report(&NodeReport {
            name: self.name.clone(),
            outcome,
            duration,
            started_at: self.started_at,
            output: output.clone(),
        });

        if outcome == Outcome::Fail || self.shared.verbose {
            let header = format!("--- {}: {} ({})\n", outcome, self.name, fmt_duration(duration));
            self.flush_to_parent(&header, &output);
        }
    }

    fn flush_to_parent(&self, header: &str, output: &str) {
        let Some(parent) = self.parent() else {
            return;
        };
        if parent.level == 0 {
            let mut text = String::with_capacity(header.len() + output.len());
            text.push_str(header);
            text.push_str(output);
            self.shared.emit(&text);
            return;
        }
        let mut state = parent.state.write();
        indent_into(&mut state.output, header);
        indent_into(&mut state.output, output);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("phase", &self.phase())
            .field("done", &self.done())
            .finish()
    }
}

fn indent_into(buf: &mut String, text: &str) {
    for line in text.split_inclusive('\n') {
        buf.push_str(INDENT);
        buf.push_str(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_shared(verbose: bool) -> (Arc<Shared>, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink: Sink = Arc::new(Mutex::new(Box::new(SharedBuf(buf.clone()))));
        let shared = Arc::new(Shared {
            matcher: Matcher::new("").unwrap(),
            scheduler: Arc::new(Scheduler::new(1)),
            verbose,
            sink,
            reporters: Reporters::new(),
            registry: Arc::new(Registry::default()),
            output_dir: None,
        });
        (shared, buf)
    }

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failure_propagates_to_ancestors() {
        let (shared, _) = make_shared(false);
        let root = Node::root(shared, CancellationToken::new());
        let top = Node::child(&root, "top".to_string());
        let leaf = Node::child(&top, "top/leaf".to_string());

        leaf.fail();
        assert!(leaf.failed());
        assert!(top.failed());
        assert!(root.failed());
    }

    #[test]
    fn test_skip_after_error_is_failure() {
        let (shared, _) = make_shared(false);
        let root = Node::root(shared, CancellationToken::new());
        let top = Node::child(&root, "top".to_string());
        top.fail();
        top.skip();
        assert_eq!(top.outcome(), Outcome::Fail);
    }

    #[test]
    fn test_report_indents_nested_output() {
        let (shared, buf) = make_shared(false);
        let root = Node::root(shared, CancellationToken::new());
        let top = Node::child(&root, "top".to_string());
        let leaf = Node::child(&top, "top/leaf".to_string());

        top.log("node.rs:1", "before");
        leaf.log("node.rs:2", "boom\nsecond line");
        leaf.fail();
        leaf.report();
        top.report();

        let out = String::from_utf8(buf.lock().clone()).unwrap();
        let want = "--- FAIL: top (0.00s)\n\
                    \x20   node.rs:1: before\n\
                    \x20   --- FAIL: top/leaf (0.00s)\n\
                    \x20       node.rs:2: boom\n\
                    \x20           second line\n";
        assert_eq!(out, want);
    }

    #[test]
    fn test_passing_output_is_quiet_unless_verbose() {
        let (shared, buf) = make_shared(false);
        let root = Node::root(shared, CancellationToken::new());
        let top = Node::child(&root, "top".to_string());
        top.log("node.rs:1", "hidden");
        top.report();
        assert!(buf.lock().is_empty());

        let (shared, buf) = make_shared(true);
        let root = Node::root(shared, CancellationToken::new());
        let top = Node::child(&root, "top".to_string());
        top.skip();
        top.report();
        let out = String::from_utf8(buf.lock().clone()).unwrap();
        assert_eq!(out, "--- SKIP: top (0.00s)\n");
    }

    #[test]
    fn test_registry_snapshot_skips_root() {
        let (shared, _) = make_shared(false);
        let registry = shared.registry.clone();
        let root = Node::root(shared, CancellationToken::new());
        let b = Node::child(&root, "b".to_string());
        let a = Node::child(&root, "a".to_string());
        a.set_phase(Phase::Running);

        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.snapshot(),
            vec![
                ("a".to_string(), Phase::Running),
                ("b".to_string(), Phase::Created)
            ]
        );
        registry.remove(b.id);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_abort_all_stops_tasks_and_closes_registry() {
        let (shared, _) = make_shared(false);
        let registry = shared.registry.clone();
        let root = Node::root(shared, CancellationToken::new());
        let stuck = Node::child(&root, "stuck".to_string());
        let task = tokio::spawn(std::future::pending::<()>());
        registry.attach(stuck.id, task.abort_handle());

        let aborted = registry.abort_all();
        assert_eq!(aborted.len(), 1);
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(registry.len(), 0);

        // A task attached after teardown does not survive it.
        let late = Node::child(&root, "late".to_string());
        let task = tokio::spawn(std::future::pending::<()>());
        registry.attach(late.id, task.abort_handle());
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_child_token_follows_parent() {
        let (shared, _) = make_shared(false);
        let root = Node::root(shared, CancellationToken::new());
        let top = Node::child(&root, "top".to_string());
        root.token.cancel();
        assert!(top.token.is_cancelled());
    }
}
