//! Admission control
//!
//! Bounds the number of test bodies executing at once. Sequential subtests
//! run on their parent's slot; only parallel tests acquire slots of their
//! own, and a test waiting for its parallel subtests hands its slot back.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::trace;

#[derive(Debug, Default)]
struct Slots {
    running: usize,
    waiting: VecDeque<oneshot::Sender<()>>,
}

/// Global concurrency budget shared by every node of a suite
#[derive(Debug)]
pub struct Scheduler {
    max_parallel: usize,
    slots: Mutex<Slots>,
}

impl Scheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Number of slots currently held.
    pub fn running(&self) -> usize {
        self.slots.lock().running
    }

    /// Number of tests queued for a slot.
    pub fn waiting(&self) -> usize {
        self.slots.lock().waiting.len()
    }

    /// Takes the main slot for the sequential dispatch of a suite, regardless
    /// of the budget.
    pub(crate) fn occupy_main(&self) {
        self.slots.lock().running += 1;
    }

    /// Waits for a slot.
    pub async fn acquire(&self) {
        let rx = {
            let mut slots = self.slots.lock();
            if slots.running < self.max_parallel {
                slots.running += 1;
                return;
            }
            let (tx, rx) = oneshot::channel();
            slots.waiting.push_back(tx);
            trace!(waiting = slots.waiting.len(), "queued for admission");
            rx
        };
        // The releasing side hands its slot over, so `running` is unchanged.
        let _ = rx.await;
    }

    /// Gives a slot back, passing it to the oldest waiter if there is one.
    pub fn release(&self) {
        let mut slots = self.slots.lock();
        while let Some(waiter) = slots.waiting.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
            // The waiter was dropped before admission; try the next one.
        }
        debug_assert!(slots.running > 0, "release without a matching acquire");
        slots.running = slots.running.saturating_sub(1);
    }

    /// Forgets every held slot and drops the queued waiters. Only valid once
    /// the tasks holding or waiting for slots are gone.
    pub(crate) fn reset(&self) {
        let mut slots = self.slots.lock();
        slots.running = 0;
        slots.waiting.clear();
    }
}
