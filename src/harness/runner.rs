//! Test execution
//!
//! Every node runs on its own tokio task. A sequential subtest is awaited by
//! the `run` call that started it; a subtest that calls `parallel` signals
//! `run` to return early, then waits for its parent's body to finish and for
//! a scheduler slot. The parent collects such subtests after its body.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, error};

use super::handle::H;
use super::node::{BodyExit, Node, Phase};
use crate::utils::fmt_duration;

/// A test body, boxed for spawning.
pub(crate) type BodyFn = Box<dyn FnOnce(H) -> BoxFuture<'static, ()> + Send>;

impl H {
    /// Runs `f` as a subtest named `name` and reports whether it succeeded.
    ///
    /// Returns once the subtest finishes, or as soon as it calls `parallel`,
    /// in which case the result is `true` and the subtest completes after
    /// this test's body. A name filtered out by the run pattern also yields
    /// `true` without running anything.
    pub async fn run<F, Fut>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(H) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.start(name, None, Box::new(move |h| f(h).boxed()))
            .await
    }

    /// Like `run`, failing the subtest if its body outlives `limit`.
    pub async fn run_timeout<F, Fut>(&self, name: &str, limit: Duration, f: F) -> bool
    where
        F: FnOnce(H) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.start(name, Some(limit), Box::new(move |h| f(h).boxed()))
            .await
    }

    pub(crate) async fn start(&self, name: &str, limit: Option<Duration>, body: BodyFn) -> bool {
        let parent = &self.node;
        parent.set_has_sub();

        let (full_name, ok) = parent.shared.matcher.full_name(&parent.name, name);
        if !ok {
            debug!("Skipping {} (does not match)", full_name);
            return true;
        }

        let child = Node::child(parent, full_name);
        if child.shared.verbose {
            child.shared.emit(&format!("=== RUN   {}\n", child.name));
        }

        let (release_tx, release_rx) = oneshot::channel();
        *child.release.lock() = Some(release_tx);

        let mut handle = tokio::spawn(drive(child.clone(), limit, body));
        child.shared.registry.attach(child.id, handle.abort_handle());
        tokio::select! {
            Ok(()) = release_rx => {
                *child.task.lock() = Some(handle);
                true
            }
            joined = &mut handle => {
                propagate(joined);
                !child.failed()
            }
        }
    }

    /// Signals that this test runs in parallel with its parallel siblings.
    ///
    /// The call returns once the parent's body has finished and the
    /// scheduler admits the test. Calling it twice, or from outside a test,
    /// panics.
    pub async fn parallel(&self) {
        let node = &self.node;
        let Some(parent) = node.parent() else {
            panic!("harness: parallel called outside of a test");
        };
        if !node.mark_parallel() {
            panic!("harness: parallel called multiple times on {}", node.name);
        }

        // Waiting for the parent and for a slot is not part of the duration.
        node.timer.lock().pause();

        parent.sub.lock().push(node.clone());
        let mut barrier = parent.barrier.subscribe();
        let release = node.release.lock().take();
        if let Some(release) = release {
            let _ = release.send(());
        }

        node.set_phase(Phase::SuspendedAtBarrier);
        let _ = barrier.wait_for(|open| *open).await;

        node.set_phase(Phase::SuspendedForAdmission);
        node.shared.scheduler.acquire().await;

        node.set_phase(Phase::Running);
        node.timer.lock().resume();
        debug!("Resuming {} in parallel", node.name);
    }
}

/// Runs one node to completion: its body, then any parallel subtests it
/// started, then reporting.
pub(crate) async fn drive(node: Arc<Node>, limit: Option<Duration>, body: BodyFn) {
    let h = H { node: node.clone() };
    node.set_phase(Phase::Running);
    node.timer.lock().resume();

    let guarded = AssertUnwindSafe(async move { body(h).await }).catch_unwind();
    tokio::pin!(guarded);
    let result = match limit {
        Some(limit) => tokio::select! {
            result = &mut guarded => result,
            _ = tokio::time::sleep(limit) => {
                node.log("harness", &format!("test timed out after {}", fmt_duration(limit)));
                node.fail();
                node.token.cancel();
                guarded.await
            }
        },
        None => guarded.await,
    };
    node.timer.lock().pause();

    match result {
        Ok(()) => node.set_finished(),
        Err(payload) if payload.is::<BodyExit>() => debug_assert!(node.finished()),
        Err(payload) => {
            error!("Test {} panicked", node.name);
            node.fail();
            node.report();
            node.shared.registry.remove(node.id);
            std::panic::resume_unwind(payload);
        }
    }

    let subs = std::mem::take(&mut *node.sub.lock());
    let scheduler = &node.shared.scheduler;
    if !subs.is_empty() {
        // Lend our slot to the subtests while they run.
        scheduler.release();
        node.set_phase(Phase::AwaitingChildren);
        node.barrier.send_replace(true);
        debug!("Released {} parallel subtests of {}", subs.len(), node.name);

        for sub in subs {
            let handle = sub.task.lock().take();
            if let Some(handle) = handle {
                propagate(handle.await);
            }
        }

        if !node.is_parallel() {
            scheduler.acquire().await;
        }
    } else if node.is_parallel() {
        scheduler.release();
    }

    node.report();
    node.set_done();
    if node.level > 0 && !node.has_sub() {
        node.set_ran();
    }
    node.token.cancel();
    node.set_phase(Phase::Done);
    node.shared.registry.remove(node.id);
    debug!("Finished {}", node.name);
}

/// Re-raises a subtest panic in the waiting task.
pub(crate) fn propagate(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            std::panic::resume_unwind(err.into_panic());
        }
        panic!("harness: test task cancelled: {err}");
    }
}
