//! Run identity, status and the report handed back to the caller.

use crate::error::AcquireError;
use crate::progress::RunCounters;
use chrono::{DateTime, Utc};
use markpull_core::RunId;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which registry listing a run pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// Marking-code search results
    Codes,
    /// Document list plus per-document line items
    Documents,
}

impl Flow {
    /// Stable lowercase name, used in export file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Codes => "codes",
            Self::Documents => "documents",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunStatus {
    /// Everything fetched, nothing failed
    Completed,
    /// Ran to the end, but some pages or units were skipped
    CompletedWithFailures,
    /// Stopped by the caller
    Cancelled,
    /// Stopped by a fatal registry answer
    Aborted(AcquireError),
}

impl RunStatus {
    /// Whether the returned data may be missing records.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !matches!(self, Self::Completed)
    }

    /// Short human-readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithFailures => "completed with failures",
            Self::Cancelled => "cancelled",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub pages_dispatched: u64,
    pub pages_completed: u64,
    pub pages_failed: u64,
    pub retries: u64,
    pub records: u64,
    pub distinct_keys: u64,
    pub duplicates: u64,
    pub units_scanned: u64,
    pub units_skipped: u64,
    pub units_processed: u64,
    pub units_failed: u64,
    pub elapsed: Duration,
}

impl RunStats {
    /// Collect the counters of a run. Record totals are filled in by the caller.
    #[must_use]
    pub fn from_counters(counters: &RunCounters, elapsed: Duration) -> Self {
        Self {
            pages_dispatched: RunCounters::read(&counters.pages_dispatched),
            pages_completed: RunCounters::read(&counters.pages_completed),
            pages_failed: RunCounters::read(&counters.pages_failed),
            retries: RunCounters::read(&counters.retries),
            units_scanned: RunCounters::read(&counters.units_scanned),
            units_skipped: RunCounters::read(&counters.units_skipped),
            units_processed: RunCounters::read(&counters.units_processed),
            units_failed: RunCounters::read(&counters.units_failed),
            elapsed,
            ..Self::default()
        }
    }

    /// Whether any page or unit was given up on.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.pages_failed > 0 || self.units_failed > 0
    }
}

/// Everything a run produced.
///
/// Returned for every run, including cancelled and aborted ones.
#[derive(Debug)]
pub struct RunReport<R> {
    /// Identifier used in the run's log lines
    pub run_id: RunId,
    /// Listing that was pulled
    pub flow: Flow,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// How the run ended
    pub status: RunStatus,
    /// Final totals
    pub stats: RunStats,
    /// Accumulated records, sorted by id
    pub records: Vec<R>,
    /// Export location, if the export succeeded
    pub output_path: Option<PathBuf>,
    /// Why the export failed, if it did
    pub sink_error: Option<AcquireError>,
}

impl<R> RunReport<R> {
    /// Whether the records may be incomplete.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.status.is_partial()
    }
}
