//! Per-document detail endpoint.

use crate::error::Result;
use crate::models::{DocumentInfoResponse, DocumentLine};
use crate::session::Session;
use async_trait::async_trait;
use markpull_core::UnitId;

const DOCUMENT_INFO_ENDPOINT: &str = "doc/info";

/// Fetches the child records of one top-level unit.
#[async_trait]
pub trait DetailSource: Send + Sync + 'static {
    /// Retrieve all line items of `unit`.
    async fn fetch_detail(&self, unit: &UnitId) -> Result<Vec<DocumentLine>>;
}

/// Document detail over HTTP.
#[derive(Debug, Clone)]
pub struct DocumentDetailClient {
    session: Session,
}

impl DocumentDetailClient {
    /// Create a detail client sharing `session`.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl DetailSource for DocumentDetailClient {
    async fn fetch_detail(&self, unit: &UnitId) -> Result<Vec<DocumentLine>> {
        let url = self.session.segment_url(&["doc", unit.as_str(), "info"])?;
        tracing::debug!(endpoint = DOCUMENT_INFO_ENDPOINT, unit = %unit, "requesting detail");

        let response: DocumentInfoResponse = self
            .session
            .execute(DOCUMENT_INFO_ENDPOINT, self.session.get_url(url))
            .await?;

        response.into_lines(DOCUMENT_INFO_ENDPOINT, unit)
    }
}
