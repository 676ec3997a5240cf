//! Durable, append-only record of fully processed units.
//!
//! The ledger is a flat file with one unit id per line. It only ever grows:
//! entries are appended and flushed to disk one at a time, never rewritten.
//! A read failure at startup is not fatal; the ledger then starts empty and
//! every unit is fetched again.

use crate::error::{AcquireError, Result};
use markpull_core::UnitId;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Appended after an interrupted write. Ids never contain whitespace, so a
/// line carrying this suffix can never be mistaken for a processed unit.
const TORN_MARKER: &str = " (incomplete)";

/// Persisted set of processed unit ids.
pub struct Ledger {
    path: PathBuf,
    entries: RwLock<HashSet<UnitId>>,
    /// Opened lazily on the first append
    writer: Mutex<Option<File>>,
}

impl Ledger {
    /// Load the ledger stored at `path`.
    ///
    /// A missing file is an empty ledger. An unreadable file is logged and
    /// also treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to read ledger, treating it as empty"
                );
                HashSet::new()
            }
        };

        info!(
            path = %path.display(),
            entries = entries.len(),
            "loaded processed-unit ledger"
        );

        Self {
            path,
            entries: RwLock::new(entries),
            writer: Mutex::new(None),
        }
    }

    /// Location of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `unit` was fully processed by this or an earlier run.
    #[must_use]
    pub fn contains(&self, unit: &UnitId) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains(unit))
            .unwrap_or(false)
    }

    /// Number of known processed units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether no unit has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `unit` to the ledger and flush it to disk.
    ///
    /// Recording an already-present unit is a no-op.
    pub fn mark_processed(&self, unit: &UnitId) -> Result<()> {
        if self.contains(unit) {
            return Ok(());
        }

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| self.io_error(std::io::Error::other("ledger writer lock poisoned")))?;

        let mut file = match writer.take() {
            Some(file) => file,
            None => self.open_for_append().map_err(|e| self.io_error(e))?,
        };
        // On failure the handle is dropped, so the next append reopens the
        // file and closes off any fragment this write left behind.
        file.write_all(format!("{unit}\n").as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data())
            .map_err(|e| self.io_error(e))?;
        *writer = Some(file);

        if let Ok(mut entries) = self.entries.write() {
            entries.insert(unit.clone());
        }
        debug!(unit = %unit, "recorded unit in ledger");
        Ok(())
    }

    /// Open the file for appending, closing off a torn final line first.
    fn open_for_append(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;

        let len = file.metadata()?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(len - 1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                warn!(path = %self.path.display(), "ledger ends mid-line, closing it off");
                file.write_all(format!("{TORN_MARKER}\n").as_bytes())?;
            }
        }
        Ok(file)
    }

    fn io_error(&self, source: std::io::Error) -> AcquireError {
        AcquireError::LedgerIo {
            path: self.path.clone(),
            source,
        }
    }
}

/// Parse every complete line of the ledger file.
///
/// A trailing fragment without a newline is an append that never finished
/// and is ignored.
fn load_entries(path: &Path) -> std::io::Result<HashSet<UnitId>> {
    if !path.exists() {
        debug!(path = %path.display(), "ledger file not found, starting empty");
        return Ok(HashSet::new());
    }

    let contents = std::fs::read_to_string(path)?;
    let mut entries = HashSet::new();

    let complete = match contents.rfind('\n') {
        Some(end) => &contents[..=end],
        None => "",
    };
    let torn = &contents[complete.len()..];
    if !torn.trim().is_empty() {
        warn!(
            path = %path.display(),
            fragment = %torn.trim(),
            "ignoring incomplete trailing ledger entry"
        );
    }

    for (number, line) in complete.lines().enumerate() {
        if line.trim_end().ends_with(TORN_MARKER) {
            debug!(path = %path.display(), line = number + 1, "skipping closed-off torn entry");
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match UnitId::new(line) {
            Ok(unit) => {
                entries.insert(unit);
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = number + 1,
                    error = %e,
                    "skipping invalid ledger entry"
                );
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(id: &str) -> UnitId {
        UnitId::new(id).expect("valid unit id")
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = TempDir::new().expect("create temp dir");
        let ledger = Ledger::open(tmp.path().join("ledger.txt"));
        assert!(ledger.is_empty());
        assert!(!ledger.contains(&unit("DOC-1")));
    }

    #[test]
    fn test_mark_and_reload() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("nested").join("ledger.txt");

        let ledger = Ledger::open(&path);
        ledger.mark_processed(&unit("DOC-1")).expect("append");
        ledger.mark_processed(&unit("DOC-2")).expect("append");
        ledger.mark_processed(&unit("DOC-1")).expect("idempotent append");
        assert!(ledger.contains(&unit("DOC-1")));
        drop(ledger);

        let contents = std::fs::read_to_string(&path).expect("read ledger");
        assert_eq!(contents, "DOC-1\nDOC-2\n");

        let reloaded = Ledger::open(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(&unit("DOC-2")));
    }

    #[test]
    fn test_torn_tail_is_ignored_and_closed_off() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("ledger.txt");
        std::fs::write(&path, "DOC-1\r\n\nDOC-2\nDOC-3").expect("seed ledger");

        let ledger = Ledger::open(&path);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains(&unit("DOC-1")));
        assert!(!ledger.contains(&unit("DOC-3")));

        ledger.mark_processed(&unit("DOC-4")).expect("append after torn tail");
        drop(ledger);

        let contents = std::fs::read_to_string(&path).expect("read ledger");
        assert_eq!(contents, "DOC-1\r\n\nDOC-2\nDOC-3 (incomplete)\nDOC-4\n");

        let reloaded = Ledger::open(&path);
        assert_eq!(reloaded.len(), 3);
        assert!(!reloaded.contains(&unit("DOC-3")));
        assert!(reloaded.contains(&unit("DOC-4")));
    }

    #[test]
    fn test_unreadable_ledger_is_empty() {
        let tmp = TempDir::new().expect("create temp dir");
        // A directory cannot be read as a ledger file.
        let ledger = Ledger::open(tmp.path());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_append_failure_is_reported() {
        let tmp = TempDir::new().expect("create temp dir");
        let ledger = Ledger::open(tmp.path());
        let err = ledger
            .mark_processed(&unit("DOC-1"))
            .expect_err("cannot append to a directory");
        assert!(matches!(err, AcquireError::LedgerIo { .. }));
        assert!(!ledger.contains(&unit("DOC-1")));
    }

    #[test]
    fn test_marker_lookalike_id_is_kept() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("ledger.txt");
        std::fs::write(&path, "X(incomplete)\nDOC-2 (incomplete)\n").expect("seed ledger");

        let ledger = Ledger::open(&path);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains(&unit("X(incomplete)")));
        assert!(!ledger.contains(&unit("DOC-2")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_write_reopens_on_next_append() {
        let tmp = TempDir::new().expect("create temp dir");
        let ledger = Ledger::open(tmp.path().join("ledger.txt"));
        ledger.mark_processed(&unit("DOC-1")).expect("append");

        // Swap the cached handle for one that rejects every write.
        let full = OpenOptions::new()
            .write(true)
            .open("/dev/full")
            .expect("open /dev/full");
        *ledger.writer.lock().expect("lock") = Some(full);

        let err = ledger
            .mark_processed(&unit("DOC-2"))
            .expect_err("write to a full device");
        assert!(matches!(err, AcquireError::LedgerIo { .. }));
        assert!(ledger.writer.lock().expect("lock").is_none());
        assert!(!ledger.contains(&unit("DOC-2")));

        ledger.mark_processed(&unit("DOC-3")).expect("append after reopen");
        let contents = std::fs::read_to_string(ledger.path()).expect("read ledger");
        assert_eq!(contents, "DOC-1\nDOC-3\n");
    }
}
