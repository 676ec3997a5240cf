//! Delimited-file export of a finished run.
//!
//! Rows go to a temporary file in the target directory, which is renamed
//! into place only after it was fully written and synced. Readers either see
//! the complete file or none at all.

use crate::error::{AcquireError, Result};
use chrono::{DateTime, Utc};
use markpull_core::OutputConfig;
use markpull_registry::Record;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Writes record snapshots as delimited text files.
#[derive(Debug, Clone)]
pub struct CsvSink {
    directory: PathBuf,
    delimiter: u8,
}

impl CsvSink {
    /// Create a sink writing into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            directory: directory.into(),
            delimiter,
        }
    }

    /// Build a sink from the export settings and the resolved directory.
    pub fn from_config(config: &OutputConfig, directory: impl Into<PathBuf>) -> Result<Self> {
        let delimiter = u8::try_from(config.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                AcquireError::InvalidSettings(format!(
                    "output delimiter {:?} is not a single ASCII character",
                    config.delimiter
                ))
            })?;
        Ok(Self::new(directory, delimiter))
    }

    /// Directory exports are written to.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File name for a run of `flow` started at `started_at` with `count` rows.
    #[must_use]
    pub fn file_name(flow: &str, started_at: DateTime<Utc>, count: usize) -> String {
        format!("{flow}_{}_{count}.csv", started_at.format("%Y%m%d_%H%M%S"))
    }

    /// Sort `records` by id and write them with a header row.
    ///
    /// Blocking; call it from a blocking task.
    pub fn write<R>(
        &self,
        flow: &str,
        started_at: DateTime<Utc>,
        records: &mut [R],
    ) -> Result<PathBuf>
    where
        R: Record + Serialize,
    {
        records.sort_by(|a, b| a.record_id().cmp(b.record_id()));
        let target = self
            .directory
            .join(Self::file_name(flow, started_at, records.len()));

        self.write_atomically(&target, records)
            .map_err(|reason| AcquireError::SinkIo {
                path: target.clone(),
                reason,
            })?;

        info!(path = %target.display(), rows = records.len(), "export written");
        Ok(target)
    }

    fn write_atomically<R: Serialize>(
        &self,
        target: &Path,
        records: &[R],
    ) -> std::result::Result<(), String> {
        std::fs::create_dir_all(&self.directory)
            .map_err(|e| format!("cannot create export directory: {e}"))?;

        let staging = NamedTempFile::new_in(&self.directory)
            .map_err(|e| format!("cannot create temporary file: {e}"))?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .from_writer(staging);
        for record in records {
            writer.serialize(record).map_err(|e| e.to_string())?;
        }
        let mut staging = writer.into_inner().map_err(|e| e.to_string())?;
        staging.flush().map_err(|e| e.to_string())?;
        staging
            .as_file()
            .sync_all()
            .map_err(|e| format!("cannot sync export: {e}"))?;

        staging
            .persist(target)
            .map_err(|e| format!("cannot move export into place: {}", e.error))?;
        Ok(())
    }
}
