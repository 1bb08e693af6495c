//! Shared progress counter for pool workers

use std::sync::{Arc, Mutex};

/// Number of reporting steps a batch is divided into (every 20%)
const MILESTONE_STEPS: usize = 5;

/// One progress report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Items finished so far (success or failure)
    pub done: usize,
    /// Total items in the batch
    pub total: usize,
    /// Whether the finished item succeeded
    pub succeeded: bool,
    /// Whether `done` crosses a reporting step or completes the batch
    pub milestone: bool,
}

/// Callback receiving progress reports
pub type ProgressSink = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Counter shared by all workers of one batch
///
/// The sink is invoked while the counter is held, so reports arrive in
/// strictly increasing `done` order and no value is reported twice.
pub struct ProgressCounter {
    total: usize,
    done: Mutex<usize>,
    sink: ProgressSink,
}

impl ProgressCounter {
    /// Counter for a batch of `total` items
    pub fn new(total: usize, sink: ProgressSink) -> Self {
        Self {
            total,
            done: Mutex::new(0),
            sink,
        }
    }

    /// Counter that reports nowhere
    #[cfg(test)]
    pub(crate) fn silent(total: usize) -> Self {
        Self::new(total, Arc::new(|_| {}))
    }

    /// Record one finished item and report it
    pub fn record(&self, succeeded: bool) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        *done += 1;
        (self.sink)(ProgressUpdate {
            done: *done,
            total: self.total,
            succeeded,
            milestone: is_milestone(*done, self.total),
        });
    }
}

/// Whether `done` of `total` is worth a user-facing report
///
/// Reports happen every `ceil(total / 5)` items and on completion, so a
/// user sees at most about six messages however large the batch.
pub fn is_milestone(done: usize, total: usize) -> bool {
    let step = total.div_ceil(MILESTONE_STEPS).max(1);
    done == total || done % step == 0
}
