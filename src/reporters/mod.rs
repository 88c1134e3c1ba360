//! Result reporters
//!
//! The harness hands every finished node to the configured reporters. How
//! results are persisted is up to the reporter; [`Collector`] keeps them in
//! memory for a summary at the end of the run.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::harness::SuiteOutcome;
use crate::models::{NodeReport, SuiteSummary};

/// Receives node results as the suite runs
pub trait Reporter: Send + Sync {
    /// Called once per node, after all of its subtests have finished.
    fn report(&self, event: &NodeReport);

    /// Called once when the suite finishes.
    fn finish(&self, _outcome: SuiteOutcome) {}
}

/// Fan-out over several reporters
#[derive(Clone, Default)]
pub struct Reporters {
    inner: Vec<Arc<dyn Reporter>>,
}

impl Reporters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, reporter: Arc<dyn Reporter>) {
        self.inner.push(reporter);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn report(&self, event: &NodeReport) {
        for reporter in &self.inner {
            reporter.report(event);
        }
    }

    pub fn finish(&self, outcome: SuiteOutcome) {
        for reporter in &self.inner {
            reporter.finish(outcome);
        }
    }
}

impl std::fmt::Debug for Reporters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporters")
            .field("count", &self.inner.len())
            .finish()
    }
}

/// In-memory reporter
#[derive(Debug, Default)]
pub struct Collector {
    results: Mutex<Vec<NodeReport>>,
    outcome: Mutex<Option<SuiteOutcome>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reports in completion order.
    pub fn results(&self) -> Vec<NodeReport> {
        self.results.lock().clone()
    }

    pub fn get(&self, name: &str) -> Option<NodeReport> {
        self.results.lock().iter().find(|r| r.name == name).cloned()
    }

    pub fn outcome(&self) -> Option<SuiteOutcome> {
        *self.outcome.lock()
    }

    pub fn summary(&self) -> SuiteSummary {
        SuiteSummary::new(self.results())
    }
}

impl Reporter for Collector {
    fn report(&self, event: &NodeReport) {
        self.results.lock().push(event.clone());
    }

    fn finish(&self, outcome: SuiteOutcome) {
        *self.outcome.lock() = Some(outcome);
    }
}
