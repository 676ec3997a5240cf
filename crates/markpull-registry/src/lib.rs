//! Markpull Registry - typed clients for the remote marking registry.
//!
//! The registry exposes cursor-paginated search endpoints (marking codes,
//! business documents) and a per-document detail endpoint. This crate turns
//! them into typed records behind the [`PageSource`] and [`DetailSource`]
//! traits, and classifies every failure as transient, fatal, or protocol.
//!
//! # Example
//!
//! ```rust,ignore
//! use markpull_registry::{CodeSearchClient, PageSource, SearchFilter, Session};
//!
//! let session = Session::new(&config.registry, &token)?;
//! let client = CodeSearchClient::new(session, SearchFilter::from_json(r#"{"status":"INTRODUCED"}"#)?);
//! let first = client.fetch_page(None).await?;
//! println!("{} codes, last page: {}", first.records.len(), first.is_last_page);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod detail;
pub mod error;
pub mod models;
pub mod pagination;
pub mod session;

// Re-export commonly used types
pub use detail::{DetailSource, DocumentDetailClient};
pub use error::{RegistryError, Result};
pub use models::{
    CodeRecord, DocumentLine, DocumentSummary, Page, PagedRecord, Record, SearchFilter,
};
pub use pagination::{CodeSearchClient, DocumentListClient, PageSource};
pub use session::Session;
