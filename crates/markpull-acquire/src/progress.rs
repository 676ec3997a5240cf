//! Throttled progress publication.
//!
//! Workers call [`ProgressReporter::tick`] whenever they finish something.
//! At most one snapshot per interval reaches the listener no matter how many
//! ticks arrive; [`ProgressReporter::finish`] always emits one last,
//! unthrottled snapshot with the final totals.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

/// Aggregate counters published to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Distinct records accumulated so far
    pub records_so_far: u64,
    /// Pages fetched so far
    pub pages_so_far: u64,
    /// Distinct secondary keys (product codes) so far
    pub distinct_keys: u64,
    /// Top-level units discovered so far (document flow)
    pub units_scanned: u64,
    /// Set only on the final snapshot of a run
    pub done: bool,
}

/// Receives progress snapshots.
///
/// Called from worker tasks; implementations must not block and must not
/// assume any particular thread.
pub trait ProgressListener: Send + Sync {
    /// Handle one snapshot.
    fn on_progress(&self, snapshot: ProgressSnapshot);
}

impl<F> ProgressListener for F
where
    F: Fn(ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self(snapshot);
    }
}

impl ProgressListener for UnboundedSender<ProgressSnapshot> {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        // A caller that stopped listening is not an error for the run.
        let _ = self.send(snapshot);
    }
}

/// Listener that drops everything.
pub struct SilentListener;

impl ProgressListener for SilentListener {
    fn on_progress(&self, _snapshot: ProgressSnapshot) {}
}

/// Monotonic counters shared by the scheduler and the detail enricher.
#[derive(Debug, Default)]
pub struct RunCounters {
    /// Work items handed to a worker
    pub pages_dispatched: AtomicU64,
    /// Pages fetched and consumed
    pub pages_completed: AtomicU64,
    /// Pages abandoned after a worker error
    pub pages_failed: AtomicU64,
    /// Retries after transient failures
    pub retries: AtomicU64,
    /// Distinct units discovered
    pub units_scanned: AtomicU64,
    /// Units skipped because the ledger already had them
    pub units_skipped: AtomicU64,
    /// Units whose detail was fetched and accumulated
    pub units_processed: AtomicU64,
    /// Units whose detail fetch failed
    pub units_failed: AtomicU64,
}

impl RunCounters {
    /// Increment `counter` by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read `counter`.
    #[must_use]
    pub fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

type Sampler = Box<dyn Fn() -> ProgressSnapshot + Send + Sync>;

/// Throttled publisher of progress snapshots.
pub struct ProgressReporter {
    listener: Arc<dyn ProgressListener>,
    sampler: Sampler,
    interval: Duration,
    last_emit: Mutex<Option<Instant>>,
    finished: AtomicBool,
}

impl ProgressReporter {
    /// Create a reporter that reads its totals from `sampler`.
    pub fn new<S>(listener: Arc<dyn ProgressListener>, interval: Duration, sampler: S) -> Self
    where
        S: Fn() -> ProgressSnapshot + Send + Sync + 'static,
    {
        Self {
            listener,
            sampler: Box::new(sampler),
            interval,
            last_emit: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    /// Emit a snapshot unless one went out less than one interval ago.
    ///
    /// Returns whether a snapshot was emitted.
    pub fn tick(&self) -> bool {
        if self.finished.load(Ordering::Acquire) {
            return false;
        }

        {
            let Ok(mut last) = self.last_emit.lock() else {
                return false;
            };
            let now = Instant::now();
            if last.is_some_and(|at| now.duration_since(at) < self.interval) {
                return false;
            }
            *last = Some(now);
        }

        let mut snapshot = (self.sampler)();
        snapshot.done = false;
        self.listener.on_progress(snapshot);
        true
    }

    /// Emit the final snapshot. Only the first call has any effect.
    pub fn finish(&self) -> ProgressSnapshot {
        let mut snapshot = (self.sampler)();
        snapshot.done = true;
        if !self.finished.swap(true, Ordering::AcqRel) {
            self.listener.on_progress(snapshot);
        }
        snapshot
    }
}
