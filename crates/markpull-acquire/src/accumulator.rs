//! Deduplicating, concurrency-safe record accumulation.
//!
//! Every worker of a run inserts into the same [`Accumulator`]. Records are
//! keyed by their identifier in a sharded map, so a record seen on two
//! overlapping pages is kept once. Running totals are plain atomics and can
//! be read at any time without touching the maps.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use markpull_registry::Record;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe aggregation of fetched records.
///
/// There is no removal operation: once inserted, a record stays until the
/// accumulator is dropped.
pub struct Accumulator<R: Record> {
    records: DashMap<String, R>,
    secondary_keys: DashSet<String>,
    count: AtomicU64,
    distinct_keys: AtomicU64,
    duplicates: AtomicU64,
}

impl<R: Record> Accumulator<R> {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            secondary_keys: DashSet::new(),
            count: AtomicU64::new(0),
            distinct_keys: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
        }
    }

    /// Insert a record. Returns `false` if a record with the same id was
    /// already present, in which case the stored record is kept.
    pub fn add(&self, record: R) -> bool {
        let secondary = record.secondary_key().map(str::to_owned);

        match self.records.entry(record.record_id().to_owned()) {
            Entry::Occupied(_) => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
        self.count.fetch_add(1, Ordering::Release);

        if let Some(key) = secondary {
            if self.secondary_keys.insert(key) {
                self.distinct_keys.fetch_add(1, Ordering::Release);
            }
        }
        true
    }

    /// Insert every record of a batch, returning how many were new.
    pub fn add_all(&self, records: impl IntoIterator<Item = R>) -> usize {
        records.into_iter().map(|r| self.add(r)).filter(|&new| new).count()
    }

    /// Number of distinct records inserted so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Number of distinct secondary keys seen so far.
    #[must_use]
    pub fn distinct_secondary_key_count(&self) -> u64 {
        self.distinct_keys.load(Ordering::Acquire)
    }

    /// Number of inserts rejected as duplicates.
    #[must_use]
    pub fn duplicate_count(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    /// Copy out the current record set, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<R> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }
}

impl<R: Record> Default for Accumulator<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        product: Option<String>,
    }

    impl Record for Row {
        fn record_id(&self) -> &str {
            &self.id
        }

        fn secondary_key(&self) -> Option<&str> {
            self.product.as_deref()
        }
    }

    fn row(id: usize, product: usize) -> Row {
        Row {
            id: format!("r{id}"),
            product: Some(format!("p{product}")),
        }
    }

    #[test]
    fn test_add_deduplicates() {
        let acc = Accumulator::new();
        assert!(acc.add(row(1, 1)));
        assert!(acc.add(row(2, 1)));
        assert!(!acc.add(row(1, 7)));

        assert_eq!(acc.count(), 2);
        assert_eq!(acc.distinct_secondary_key_count(), 1);
        assert_eq!(acc.duplicate_count(), 1);
        assert_eq!(acc.snapshot().len(), 2);
    }

    #[test]
    fn test_records_without_secondary_key() {
        let acc = Accumulator::new();
        acc.add(Row {
            id: "x".to_string(),
            product: None,
        });
        assert_eq!(acc.count(), 1);
        assert_eq!(acc.distinct_secondary_key_count(), 0);
    }

    #[test]
    fn test_add_all_counts_new() {
        let acc = Accumulator::new();
        assert_eq!(acc.add_all((0..10).map(|i| row(i, i % 3))), 10);
        assert_eq!(acc.add_all((5..15).map(|i| row(i, i % 3))), 5);
        assert_eq!(acc.count(), 15);
        assert_eq!(acc.distinct_secondary_key_count(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_and_reads() {
        let acc = Arc::new(Accumulator::new());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let acc = Arc::clone(&acc);
            handles.push(tokio::spawn(async move {
                let mut last_seen = 0;
                for i in 0..500 {
                    // Every worker overlaps half of its range with the next one.
                    acc.add(row(worker * 250 + i, i % 50));
                    let now = acc.count();
                    assert!(now >= last_seen, "count went backwards");
                    last_seen = now;
                }
            }));
        }
        for handle in handles {
            handle.await.expect("worker task");
        }

        assert_eq!(acc.count(), 7 * 250 + 500);
        assert_eq!(acc.snapshot().len() as u64, acc.count());
        assert_eq!(acc.distinct_secondary_key_count(), 50);
        assert_eq!(acc.duplicate_count(), 8 * 500 - acc.count());
    }
}
