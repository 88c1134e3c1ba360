//! Timer utilities
//!
//! Provides timing and measurement helpers.

use std::time::{Duration, Instant};

/// Timer that only accumulates while running.
///
/// A parallel test pauses its timer while it queues behind its parent and the
/// admission controller, so the reported duration covers execution only.
#[derive(Debug, Default)]
pub struct SplitTimer {
    accumulated: Duration,
    started: Option<Instant>,
}

impl SplitTimer {
    /// Create a stopped timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) measuring
    pub fn resume(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    /// Stop measuring and fold the running split into the total
    pub fn pause(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Get total measured time, including a running split
    pub fn total(&self) -> Duration {
        self.accumulated + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

/// Formats a duration as "87.00s".
pub fn fmt_duration(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}
