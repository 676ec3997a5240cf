use markpull_core::UnitId;
use markpull_registry::RegistryError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("worker gave up on page after retry: {source}")]
    Worker {
        #[source]
        source: RegistryError,
    },

    #[error("detail fetch failed for unit {unit}: {source}")]
    Detail {
        unit: UnitId,
        #[source]
        source: RegistryError,
    },

    #[error("registry error: {0}")]
    Remote(#[from] RegistryError),

    #[error("ledger I/O error at {path}: {source}")]
    LedgerIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export failed for {path}: {reason}")]
    SinkIo { path: PathBuf, reason: String },

    #[error("invalid acquisition settings: {0}")]
    InvalidSettings(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AcquireError>;
