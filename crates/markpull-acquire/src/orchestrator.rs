//! Acquisition orchestrator tying a run together.
//!
//! This module provides the `AcquisitionOrchestrator`, which wires a page
//! source into the scheduler, runs the detail enricher for the document flow,
//! exports whatever was accumulated and emits the final progress snapshot.

use crate::accumulator::Accumulator;
use crate::enricher::{DetailEnricher, UnitDispatcher};
use crate::error::{AcquireError, Result};
use crate::ledger::Ledger;
use crate::progress::{ProgressListener, ProgressReporter, ProgressSnapshot, RunCounters};
use crate::run::{Flow, RunReport, RunStats, RunStatus};
use crate::scheduler::{PageConsumer, ScheduleOutcome, Scheduler};
use crate::sink::CsvSink;
use chrono::{DateTime, Utc};
use markpull_core::{AcquisitionConfig, RunId, MAX_PAGE_SIZE};
use markpull_registry::{DetailSource, DocumentLine, DocumentSummary, PageSource, Record};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs acquisition flows with one set of settings and one export target.
pub struct AcquisitionOrchestrator {
    settings: AcquisitionConfig,
    sink: CsvSink,
}

/// Per-run state shared by the stages of one run.
struct RunContext<R: Record> {
    run_id: RunId,
    flow: Flow,
    started_at: DateTime<Utc>,
    clock: Instant,
    records: Arc<Accumulator<R>>,
    counters: Arc<RunCounters>,
    progress: Arc<ProgressReporter>,
}

impl AcquisitionOrchestrator {
    /// Create an orchestrator, rejecting unusable settings.
    pub fn new(settings: &AcquisitionConfig, sink: CsvSink) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| AcquireError::InvalidSettings(e.to_string()))?;
        Ok(Self {
            settings: settings.clone(),
            sink,
        })
    }

    /// The settings runs use.
    #[must_use]
    pub fn settings(&self) -> &AcquisitionConfig {
        &self.settings
    }

    /// Pull every page of `source` into one deduplicated record set.
    ///
    /// The report is returned however the run ends; a fatal registry answer
    /// shows up as [`RunStatus::Aborted`] next to the partial data.
    pub async fn run_paged<S>(
        &self,
        flow: Flow,
        source: Arc<S>,
        listener: Arc<dyn ProgressListener>,
        cancel: CancellationToken,
    ) -> Result<RunReport<S::Record>>
    where
        S: PageSource,
        S::Record: Serialize,
    {
        check_page_size(source.page_size())?;
        let ctx: RunContext<S::Record> = self.start(flow, listener);

        let scheduler = self.scheduler(
            source,
            Arc::clone(&ctx.records) as Arc<dyn PageConsumer<S::Record>>,
            &ctx,
        );
        let outcome = scheduler.run(&cancel).await;
        drop(scheduler);

        let status = self.status(outcome, &cancel, &ctx.counters);
        Ok(self.finish(ctx, status).await)
    }

    /// Pull the document list and the detail of every unprocessed document.
    ///
    /// Units already in `ledger` are counted but never fetched. A unit is
    /// appended to the ledger only after its lines were accumulated.
    pub async fn run_documents<S, D>(
        &self,
        list: Arc<S>,
        detail: Arc<D>,
        ledger: Arc<Ledger>,
        listener: Arc<dyn ProgressListener>,
        cancel: CancellationToken,
    ) -> Result<RunReport<DocumentLine>>
    where
        S: PageSource<Record = DocumentSummary>,
        D: DetailSource,
    {
        check_page_size(list.page_size())?;
        let ctx: RunContext<DocumentLine> = self.start(Flow::Documents, listener);
        let run_token = cancel.child_token();

        let (units_tx, units_rx) = tokio::sync::mpsc::unbounded_channel();
        let enricher = DetailEnricher::new(
            detail,
            Arc::clone(&ledger),
            Arc::clone(&ctx.records),
            Arc::clone(&ctx.counters),
            Arc::clone(&ctx.progress),
        )
        .with_delay(Duration::from_millis(self.settings.detail_delay_ms))
        .with_retry_delay(Duration::from_millis(self.settings.retry_delay_ms));
        let enriching = tokio::spawn(enricher.run(units_rx, run_token.clone()));

        let dispatcher = UnitDispatcher::new(ledger, Arc::clone(&ctx.counters), units_tx);
        let scheduler = self.scheduler(
            list,
            Arc::new(dispatcher) as Arc<dyn PageConsumer<DocumentSummary>>,
            &ctx,
        );
        let outcome = scheduler.run(&run_token).await;
        // Dropping the dispatcher closes the unit channel.
        drop(scheduler);

        if matches!(outcome, ScheduleOutcome::Aborted(_)) {
            run_token.cancel();
        }

        let mut status = self.status(outcome, &cancel, &ctx.counters);
        if let Err(e) = enriching.await {
            error!(run_id = %ctx.run_id, error = %e, "detail enricher task failed");
            if !matches!(status, RunStatus::Aborted(_)) {
                status = RunStatus::Aborted(AcquireError::Task(e));
            }
        } else if cancel.is_cancelled() && !matches!(status, RunStatus::Aborted(_)) {
            status = RunStatus::Cancelled;
        } else if matches!(status, RunStatus::Completed)
            && RunCounters::read(&ctx.counters.units_failed) > 0
        {
            status = RunStatus::CompletedWithFailures;
        }

        Ok(self.finish(ctx, status).await)
    }

    fn start<R: Record>(&self, flow: Flow, listener: Arc<dyn ProgressListener>) -> RunContext<R> {
        let run_id = RunId::generate();
        let records = Arc::new(Accumulator::new());
        let counters = Arc::new(RunCounters::default());

        let sampled_records = Arc::clone(&records);
        let sampled_counters = Arc::clone(&counters);
        let progress = Arc::new(ProgressReporter::new(
            listener,
            Duration::from_millis(self.settings.progress_interval_ms),
            move || sample(&sampled_records, &sampled_counters),
        ));

        info!(
            run_id = %run_id,
            flow = %flow,
            concurrency = self.settings.concurrency,
            "starting acquisition run"
        );

        RunContext {
            run_id,
            flow,
            started_at: Utc::now(),
            clock: Instant::now(),
            records,
            counters,
            progress,
        }
    }

    fn scheduler<S: PageSource, R: Record>(
        &self,
        source: Arc<S>,
        consumer: Arc<dyn PageConsumer<S::Record>>,
        ctx: &RunContext<R>,
    ) -> Scheduler<S> {
        Scheduler::new(
            source,
            consumer,
            Arc::clone(&ctx.counters),
            Arc::clone(&ctx.progress),
        )
        .with_concurrency(self.settings.concurrency)
        .with_retry_delay(Duration::from_millis(self.settings.retry_delay_ms))
    }

    #[allow(clippy::unused_self)]
    fn status(
        &self,
        outcome: ScheduleOutcome,
        cancel: &CancellationToken,
        counters: &RunCounters,
    ) -> RunStatus {
        match outcome {
            ScheduleOutcome::Aborted(e) => RunStatus::Aborted(AcquireError::Remote(e)),
            ScheduleOutcome::Cancelled => RunStatus::Cancelled,
            ScheduleOutcome::Drained if cancel.is_cancelled() => RunStatus::Cancelled,
            ScheduleOutcome::Drained if RunCounters::read(&counters.pages_failed) > 0 => {
                RunStatus::CompletedWithFailures
            }
            ScheduleOutcome::Drained => RunStatus::Completed,
        }
    }

    /// Export the accumulated records, emit final progress and build the report.
    async fn finish<R>(&self, ctx: RunContext<R>, status: RunStatus) -> RunReport<R>
    where
        R: Record + Serialize,
    {
        let sink = self.sink.clone();
        let flow = ctx.flow;
        let started_at = ctx.started_at;
        let accumulated = Arc::clone(&ctx.records);
        let exported = tokio::task::spawn_blocking(move || {
            let mut rows = accumulated.snapshot();
            let written = sink.write(flow.as_str(), started_at, &mut rows);
            (written, rows)
        })
        .await;

        let (written, records) = match exported {
            Ok((written, rows)) => (written, rows),
            Err(e) => (Err(AcquireError::Task(e)), ctx.records.snapshot()),
        };
        let (output_path, sink_error) = match written {
            Ok(path) => (Some(path), None),
            Err(e) => {
                warn!(run_id = %ctx.run_id, error = %e, "export failed, data kept in memory");
                (None, Some(e))
            }
        };

        ctx.progress.finish();

        let mut stats = RunStats::from_counters(&ctx.counters, ctx.clock.elapsed());
        stats.records = ctx.records.count();
        stats.distinct_keys = ctx.records.distinct_secondary_key_count();
        stats.duplicates = ctx.records.duplicate_count();

        info!(
            run_id = %ctx.run_id,
            flow = %ctx.flow,
            status = status.label(),
            records = stats.records,
            distinct_keys = stats.distinct_keys,
            pages = stats.pages_completed,
            pages_failed = stats.pages_failed,
            retries = stats.retries,
            units_scanned = stats.units_scanned,
            units_skipped = stats.units_skipped,
            units_failed = stats.units_failed,
            elapsed_ms = u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX),
            "acquisition run finished"
        );

        RunReport {
            run_id: ctx.run_id,
            flow: ctx.flow,
            started_at: ctx.started_at,
            status,
            stats,
            records,
            output_path,
            sink_error,
        }
    }
}

/// A page size above the registry cap would end every run after one page.
fn check_page_size(page_size: usize) -> Result<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(AcquireError::InvalidSettings(format!(
            "page size must be between 1 and {MAX_PAGE_SIZE}, page source reports {page_size}"
        )));
    }
    Ok(())
}

fn sample<R: Record>(records: &Accumulator<R>, counters: &RunCounters) -> ProgressSnapshot {
    ProgressSnapshot {
        records_so_far: records.count(),
        pages_so_far: RunCounters::read(&counters.pages_completed),
        distinct_keys: records.distinct_secondary_key_count(),
        units_scanned: RunCounters::read(&counters.units_scanned),
        done: false,
    }
}
