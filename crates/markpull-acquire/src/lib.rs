//! Markpull Acquire - Incremental acquisition engine.
//!
//! This crate drives paginated registry listings to completion with bounded
//! concurrency, deduplicates what comes back, and keeps enough state on disk
//! that an interrupted document run picks up where it left off.
//!
//! # Features
//!
//! - Dynamic cursor queue with at most K page fetches in flight
//! - One retry with a fixed delay for rate limits and server errors
//! - Concurrency-safe deduplicating accumulation with live counters
//! - Append-only ledger of processed documents, safe against torn writes
//! - Throttled progress snapshots plus one final authoritative snapshot
//! - Atomic delimited-file export of every run, including partial ones
//!
//! # Example
//!
//! ```rust,ignore
//! use markpull_acquire::{AcquisitionOrchestrator, CsvSink, Flow, SilentListener};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = AcquisitionOrchestrator::new(&config.acquisition, sink)?;
//! let report = orchestrator
//!     .run_paged(
//!         Flow::Codes,
//!         Arc::new(code_search_client),
//!         Arc::new(SilentListener),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod accumulator;
pub mod enricher;
#[allow(missing_docs)]
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod progress;
#[allow(missing_docs)]
pub mod run;
pub mod scheduler;
pub mod sink;

// Re-export commonly used types
pub use accumulator::Accumulator;
pub use enricher::{DetailEnricher, UnitDispatcher};
pub use error::{AcquireError, Result};
pub use ledger::Ledger;
pub use orchestrator::AcquisitionOrchestrator;
pub use progress::{
    ProgressListener, ProgressReporter, ProgressSnapshot, RunCounters, SilentListener,
};
pub use run::{Flow, RunReport, RunStats, RunStatus};
pub use scheduler::{PageConsumer, ScheduleOutcome, Scheduler, WorkItem};
pub use sink::CsvSink;
