//! Markpull Core - Foundation crate for the Markpull registry client.
//!
//! This crate provides shared types, error handling and configuration
//! management that the registry client, the acquisition engine and the
//! application shell depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`RunId`, `UnitId`, `Cursor`)
//!
//! # Example
//!
//! ```rust
//! use markpull_core::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! config.validate()?;
//! assert_eq!(config.registry.page_size, 1000);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AcquisitionConfig, AppConfig, LedgerConfig, OutputConfig, RegistryConfig, MAX_CONCURRENCY,
    MAX_PAGE_SIZE,
};
pub use error::{ConfigError, ConfigResult, MarkpullError, Result};
pub use types::{Cursor, RunId, UnitId};
