//! In-process fake registry shared by the acquisition integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use markpull_acquire::{CsvSink, ProgressListener, ProgressSnapshot};
use markpull_core::{AcquisitionConfig, Cursor, UnitId};
use markpull_registry::{
    CodeRecord, DetailSource, DocumentLine, DocumentSummary, Page, PageSource, PagedRecord,
    RegistryError,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn base_time() -> DateTime<Utc> {
    "2024-05-01T00:00:00Z".parse().expect("base timestamp")
}

/// `count` codes ordered by emission date, spread over 37 product codes.
pub fn codes(count: usize) -> Vec<CodeRecord> {
    (0..count)
        .map(|i| CodeRecord {
            cis: format!("cis-{i:06}"),
            gtin: Some(format!("046{:011}", i % 37)),
            product_name: Some(format!("Product {}", i % 37)),
            status: "INTRODUCED".to_string(),
            owner_inn: Some("7700000000".to_string()),
            emission_date: base_time() + ChronoDuration::seconds(i64::try_from(i).expect("index")),
            emission_type: Some("LOCAL".to_string()),
        })
        .collect()
}

/// `count` documents named `DOC-0000`, `DOC-0001`, ...
pub fn documents(count: usize) -> Vec<DocumentSummary> {
    (0..count)
        .map(|i| DocumentSummary {
            id: UnitId::new(format!("DOC-{i:04}")).expect("unit id"),
            number: Some(i.to_string()),
            doc_date: base_time() + ChronoDuration::minutes(i64::try_from(i).expect("index")),
            doc_type: "LP_ACCEPT_GOODS".to_string(),
            status: "CHECKED_OK".to_string(),
            sender_inn: Some("7700000000".to_string()),
            receiver_inn: None,
        })
        .collect()
}

/// Deterministic paginated listing over a fixed record set.
///
/// A cursor resolves to the record that produced it, and the next page starts
/// right after that record.
pub struct FakeRegistry<R> {
    records: Vec<R>,
    page_size: usize,
    overlap: usize,
    latency: Option<Duration>,
    scripted: Mutex<HashMap<usize, VecDeque<u16>>>,
    cancel_on_call: Option<(usize, CancellationToken)>,
    calls: AtomicUsize,
    requested_pages: Mutex<Vec<usize>>,
}

impl<R: PagedRecord> FakeRegistry<R> {
    pub fn new(records: Vec<R>, page_size: usize) -> Self {
        Self {
            records,
            page_size,
            overlap: 0,
            latency: None,
            scripted: Mutex::new(HashMap::new()),
            cancel_on_call: None,
            calls: AtomicUsize::new(0),
            requested_pages: Mutex::new(Vec::new()),
        }
    }

    /// Start every page after the first `overlap` records early.
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer the given page with these HTTP statuses, one per attempt,
    /// before serving it normally.
    pub fn fail_page(self, page: usize, statuses: &[u16]) -> Self {
        self.scripted
            .lock()
            .expect("lock")
            .insert(page, statuses.iter().copied().collect());
        self
    }

    /// Cancel `token` when the `call`-th request arrives (1-based).
    pub fn cancel_on_call(mut self, call: usize, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Page indexes in request order, retries included.
    pub fn requested_pages(&self) -> Vec<usize> {
        self.requested_pages.lock().expect("lock").clone()
    }

    fn start_of(&self, cursor: Option<&Cursor>) -> Result<usize, RegistryError> {
        let Some(cursor) = cursor else {
            return Ok(0);
        };
        self.records
            .iter()
            .position(|r| r.cursor() == *cursor)
            .map(|p| (p + 1).saturating_sub(self.overlap))
            .ok_or_else(|| RegistryError::Fatal {
                endpoint: "fake",
                status: 400,
                message: format!("unknown cursor {cursor}"),
            })
    }
}

#[async_trait]
impl<R: PagedRecord> PageSource for FakeRegistry<R> {
    type Record = R;

    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> markpull_registry::Result<Page<R>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_on_call {
            if call == *at {
                token.cancel();
            }
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let start = self.start_of(cursor)?;
        let page = start.div_ceil(self.page_size.max(1));
        self.requested_pages.lock().expect("lock").push(page);

        let scripted = self
            .scripted
            .lock()
            .expect("lock")
            .get_mut(&page)
            .and_then(VecDeque::pop_front);
        if let Some(status) = scripted {
            return Err(RegistryError::from_status(
                "fake",
                status,
                "scripted failure".to_string(),
            ));
        }

        let end = (start + self.page_size).min(self.records.len());
        Ok(Page {
            records: self.records[start..end].to_vec(),
            is_last_page: end >= self.records.len(),
        })
    }
}

/// Detail endpoint returning `lines_per_unit` lines for every document.
pub struct FakeDetail {
    lines_per_unit: usize,
    failing: HashSet<String>,
    requested: Mutex<Vec<String>>,
}

impl FakeDetail {
    pub fn new(lines_per_unit: usize) -> Self {
        Self {
            lines_per_unit,
            failing: HashSet::new(),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Answer these documents with HTTP 404.
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().expect("lock").clone()
    }
}

#[async_trait]
impl DetailSource for FakeDetail {
    async fn fetch_detail(&self, unit: &UnitId) -> markpull_registry::Result<Vec<DocumentLine>> {
        self.requested.lock().expect("lock").push(unit.to_string());
        if self.failing.contains(unit.as_str()) {
            return Err(RegistryError::from_status(
                "fake/detail",
                404,
                "no such document".to_string(),
            ));
        }
        Ok((0..self.lines_per_unit)
            .map(|i| {
                DocumentLine::new(
                    unit.clone(),
                    format!("{unit}-cis-{i}"),
                    Some(format!("046{:011}", i)),
                    None,
                    Some("INTRODUCED".to_string()),
                )
            })
            .collect())
    }
}

/// Listener keeping every snapshot it receives.
#[derive(Default)]
pub struct Recording {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

impl Recording {
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().expect("lock").clone()
    }
}

impl ProgressListener for Recording {
    fn on_progress(&self, snapshot: ProgressSnapshot) {
        self.snapshots.lock().expect("lock").push(snapshot);
    }
}

/// Settings with short delays so tests run quickly.
pub fn settings(concurrency: usize) -> AcquisitionConfig {
    AcquisitionConfig {
        concurrency,
        retry_delay_ms: 10,
        progress_interval_ms: 500,
        detail_delay_ms: 0,
    }
}

pub fn sink(dir: &Path) -> CsvSink {
    CsvSink::new(dir.join("exports"), b';')
}
