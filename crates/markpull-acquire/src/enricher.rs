//! Ledger-gated detail fetching for the document flow.
//!
//! The document list scheduler hands every page to a [`UnitDispatcher`],
//! which drops units seen earlier in the run or already in the ledger and
//! forwards the rest over a channel. A single [`DetailEnricher`] task works
//! through that channel one unit at a time with a fixed pause between
//! requests, independent of the scheduler's worker pool.

use crate::accumulator::Accumulator;
use crate::error::AcquireError;
use crate::ledger::Ledger;
use crate::progress::{ProgressReporter, RunCounters};
use crate::scheduler::PageConsumer;
use dashmap::DashSet;
use markpull_core::UnitId;
use markpull_registry::{DetailSource, DocumentLine, DocumentSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Routes newly discovered units to the enricher.
pub struct UnitDispatcher {
    seen: DashSet<UnitId>,
    ledger: Arc<Ledger>,
    counters: Arc<RunCounters>,
    units: UnboundedSender<UnitId>,
}

impl UnitDispatcher {
    /// Create a dispatcher sending unprocessed units to `units`.
    ///
    /// The enricher's channel closes once the dispatcher is dropped.
    #[must_use]
    pub fn new(
        ledger: Arc<Ledger>,
        counters: Arc<RunCounters>,
        units: UnboundedSender<UnitId>,
    ) -> Self {
        Self {
            seen: DashSet::new(),
            ledger,
            counters,
            units,
        }
    }
}

impl PageConsumer<DocumentSummary> for UnitDispatcher {
    fn accept(&self, records: Vec<DocumentSummary>) {
        for summary in records {
            if !self.seen.insert(summary.id.clone()) {
                continue;
            }
            RunCounters::bump(&self.counters.units_scanned);

            if self.ledger.contains(&summary.id) {
                RunCounters::bump(&self.counters.units_skipped);
                debug!(unit = %summary.id, "already processed, skipping");
                continue;
            }
            // The enricher stops listening only when the run is cancelled.
            let _ = self.units.send(summary.id);
        }
    }
}

/// Fetches, accumulates and records the detail of each dispatched unit.
pub struct DetailEnricher<D: DetailSource> {
    detail: Arc<D>,
    ledger: Arc<Ledger>,
    lines: Arc<Accumulator<DocumentLine>>,
    counters: Arc<RunCounters>,
    progress: Arc<ProgressReporter>,
    delay: Duration,
    retry_delay: Duration,
}

impl<D: DetailSource> DetailEnricher<D> {
    /// Create an enricher writing line records into `lines`.
    pub fn new(
        detail: Arc<D>,
        ledger: Arc<Ledger>,
        lines: Arc<Accumulator<DocumentLine>>,
        counters: Arc<RunCounters>,
        progress: Arc<ProgressReporter>,
    ) -> Self {
        Self {
            detail,
            ledger,
            lines,
            counters,
            progress,
            delay: Duration::from_millis(200),
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set the pause between two detail requests.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the pause before retrying a transient failure.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Process units until the channel closes or `cancel` fires.
    pub async fn run(self, mut units: UnboundedReceiver<UnitId>, cancel: CancellationToken) {
        let mut first = true;

        loop {
            let unit = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                unit = units.recv() => match unit {
                    Some(unit) => unit,
                    None => break,
                },
            };

            if !first && !pause(self.delay, &cancel).await {
                break;
            }
            first = false;

            match self.fetch(&unit, &cancel).await {
                Some(Ok(lines)) => {
                    let added = self.lines.add_all(lines);
                    self.record(unit.clone()).await;
                    RunCounters::bump(&self.counters.units_processed);
                    debug!(unit = %unit, lines = added, "unit enriched");
                }
                Some(Err(e)) => {
                    RunCounters::bump(&self.counters.units_failed);
                    warn!(error = %e, "unit left for next run");
                }
                None => break,
            }
            self.progress.tick();
        }

        let abandoned = std::iter::from_fn(|| units.try_recv().ok()).count();
        if abandoned > 0 {
            debug!(abandoned, "stopped with units still queued");
        }
    }

    /// Fetch one unit's detail, retrying a transient failure once.
    ///
    /// `None` means the run was cancelled first.
    async fn fetch(
        &self,
        unit: &UnitId,
        cancel: &CancellationToken,
    ) -> Option<Result<Vec<DocumentLine>, AcquireError>> {
        let mut retried = false;
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            match self.detail.fetch_detail(unit).await {
                Err(e) if e.is_transient() && !retried => {
                    retried = true;
                    RunCounters::bump(&self.counters.retries);
                    warn!(unit = %unit, error = %e, "transient detail failure, retrying");
                    if !pause(self.retry_delay, cancel).await {
                        return None;
                    }
                }
                result => {
                    return Some(result.map_err(|source| AcquireError::Detail {
                        unit: unit.clone(),
                        source,
                    }));
                }
            }
        }
    }

    /// Append `unit` to the ledger off the async runtime.
    async fn record(&self, unit: UnitId) {
        let ledger = Arc::clone(&self.ledger);
        let appended = tokio::task::spawn_blocking(move || ledger.mark_processed(&unit)).await;

        match appended {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "could not record unit, it will be fetched again"),
            Err(e) => warn!(error = %e, "ledger append task failed"),
        }
    }
}

/// Sleep for `delay`. Returns `false` if cancelled first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
