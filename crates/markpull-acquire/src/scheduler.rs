//! Bounded work scheduler.
//!
//! Pending page cursors live in an unbounded channel. The scheduler pulls
//! items off it while a semaphore permit is free and hands each one to its
//! own task. A worker that fetched a full, non-final page pushes the
//! successor cursor back onto the channel before it finishes, so the run is
//! over exactly when the channel is empty and no worker is left running.

use crate::accumulator::Accumulator;
use crate::error::AcquireError;
use crate::progress::{ProgressReporter, RunCounters};
use markpull_core::Cursor;
use markpull_registry::{PageSource, Record, RegistryError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A pending page fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItem {
    /// `None` for the first page of a run
    pub cursor: Option<Cursor>,
}

impl WorkItem {
    /// The item every run is seeded with.
    #[must_use]
    pub fn initial() -> Self {
        Self { cursor: None }
    }
}

/// Receives the records of every successfully fetched page.
///
/// Called concurrently from worker tasks.
pub trait PageConsumer<R>: Send + Sync + 'static {
    /// Take ownership of one page of records.
    fn accept(&self, records: Vec<R>);
}

impl<R: Record> PageConsumer<R> for Accumulator<R> {
    fn accept(&self, records: Vec<R>) {
        self.add_all(records);
    }
}

/// How a scheduling loop ended.
#[derive(Debug)]
pub enum ScheduleOutcome {
    /// Queue empty and every worker finished
    Drained,
    /// The caller's token was cancelled
    Cancelled,
    /// A fatal or protocol error stopped the run
    Aborted(RegistryError),
}

/// Result of one worker task.
#[derive(Debug)]
enum WorkerOutcome {
    Completed,
    Failed(AcquireError),
    Fatal(RegistryError),
    Cancelled,
}

/// Runs page fetches with at most `concurrency` in flight.
pub struct Scheduler<S: PageSource> {
    source: Arc<S>,
    consumer: Arc<dyn PageConsumer<S::Record>>,
    counters: Arc<RunCounters>,
    progress: Arc<ProgressReporter>,
    concurrency: usize,
    retry_delay: Duration,
}

impl<S: PageSource> Scheduler<S> {
    /// Create a scheduler feeding every fetched page into `consumer`.
    pub fn new(
        source: Arc<S>,
        consumer: Arc<dyn PageConsumer<S::Record>>,
        counters: Arc<RunCounters>,
        progress: Arc<ProgressReporter>,
    ) -> Self {
        Self {
            source,
            consumer,
            counters,
            progress,
            concurrency: 5,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set the number of concurrent fetches. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the pause before retrying a transient failure.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Drive the queue until it drains, the run is cancelled, or a worker
    /// hits a fatal error.
    ///
    /// A fatal error cancels a child of `cancel`, so sibling workers stop at
    /// their next check point without cancelling the caller's token.
    pub async fn run(&self, cancel: &CancellationToken) -> ScheduleOutcome {
        let (queue, mut pending) = mpsc::unbounded_channel();
        let abort = cancel.child_token();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();
        let mut fatal: Option<RegistryError> = None;

        // The receiver is held here, so the send cannot fail.
        let _ = queue.send(WorkItem::initial());

        loop {
            if !abort.is_cancelled() {
                self.dispatch_ready(&mut pending, &queue, &permits, &abort, &mut workers);
            }
            if workers.is_empty() {
                break;
            }
            let Some(joined) = workers.join_next().await else {
                break;
            };
            if let Some(e) = self.handle_joined(joined) {
                if fatal.is_none() {
                    fatal = Some(e);
                }
                abort.cancel();
            }
        }

        let dropped = drain(&mut pending);
        if dropped > 0 {
            debug!(dropped, "discarded queued work items");
        }

        if let Some(e) = fatal {
            ScheduleOutcome::Aborted(e)
        } else if cancel.is_cancelled() {
            ScheduleOutcome::Cancelled
        } else {
            ScheduleOutcome::Drained
        }
    }

    /// Start a worker for every queued item that has a free permit.
    fn dispatch_ready(
        &self,
        pending: &mut UnboundedReceiver<WorkItem>,
        queue: &UnboundedSender<WorkItem>,
        permits: &Arc<Semaphore>,
        abort: &CancellationToken,
        workers: &mut JoinSet<WorkerOutcome>,
    ) {
        while !abort.is_cancelled() {
            let Ok(permit) = Arc::clone(permits).try_acquire_owned() else {
                break;
            };
            let Ok(item) = pending.try_recv() else {
                break;
            };

            RunCounters::bump(&self.counters.pages_dispatched);
            debug!(cursor = ?item.cursor, active = workers.len() + 1, "dispatching page fetch");

            let worker = Worker {
                source: Arc::clone(&self.source),
                consumer: Arc::clone(&self.consumer),
                counters: Arc::clone(&self.counters),
                progress: Arc::clone(&self.progress),
                queue: queue.clone(),
                cancel: abort.clone(),
                retry_delay: self.retry_delay,
            };
            workers.spawn(async move {
                let _permit = permit;
                worker.process(item).await
            });
        }
    }

    /// Book-keep a finished worker. Returns the error if the run must stop.
    fn handle_joined(
        &self,
        joined: std::result::Result<WorkerOutcome, JoinError>,
    ) -> Option<RegistryError> {
        match joined {
            Ok(WorkerOutcome::Completed | WorkerOutcome::Cancelled) => None,
            Ok(WorkerOutcome::Failed(e)) => {
                RunCounters::bump(&self.counters.pages_failed);
                warn!(error = %e, "page skipped after retry");
                None
            }
            Ok(WorkerOutcome::Fatal(e)) => {
                RunCounters::bump(&self.counters.pages_failed);
                error!(error = %e, "aborting run");
                Some(e)
            }
            Err(e) => {
                RunCounters::bump(&self.counters.pages_failed);
                error!(error = %e, "page worker task failed");
                None
            }
        }
    }
}

fn drain(pending: &mut UnboundedReceiver<WorkItem>) -> usize {
    let mut dropped = 0;
    while pending.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

struct Worker<S: PageSource> {
    source: Arc<S>,
    consumer: Arc<dyn PageConsumer<S::Record>>,
    counters: Arc<RunCounters>,
    progress: Arc<ProgressReporter>,
    queue: UnboundedSender<WorkItem>,
    cancel: CancellationToken,
    retry_delay: Duration,
}

impl<S: PageSource> Worker<S> {
    async fn process(self, item: WorkItem) -> WorkerOutcome {
        let mut retried = false;

        let page = loop {
            if self.cancel.is_cancelled() {
                return WorkerOutcome::Cancelled;
            }
            match self.source.fetch_page(item.cursor.as_ref()).await {
                Ok(page) => break page,
                Err(e) if e.is_transient() && !retried => {
                    retried = true;
                    RunCounters::bump(&self.counters.retries);
                    warn!(
                        cursor = ?item.cursor,
                        error = %e,
                        delay_ms = self.retry_delay.as_millis(),
                        "transient failure, retrying page"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => return WorkerOutcome::Cancelled,
                        () = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
                Err(source) if source.is_transient() => {
                    return WorkerOutcome::Failed(AcquireError::Worker { source });
                }
                Err(e) => return WorkerOutcome::Fatal(e),
            }
        };

        let successor = page.successor(self.source.page_size());
        let fetched = page.records.len();
        self.consumer.accept(page.records);
        RunCounters::bump(&self.counters.pages_completed);

        if let Some(cursor) = successor {
            // Fails only once the scheduler stopped listening.
            let _ = self.queue.send(WorkItem {
                cursor: Some(cursor),
            });
        }

        debug!(cursor = ?item.cursor, fetched, "page consumed");
        self.progress.tick();
        WorkerOutcome::Completed
    }
}
