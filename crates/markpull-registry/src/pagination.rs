//! Cursor-paginated list endpoints.

use crate::error::Result;
use crate::models::{
    validate_page, CodeRecord, CodeSearchResponse, DocumentListResponse, DocumentSummary, Page,
    PagedRecord, SearchFilter,
};
use crate::session::Session;
use async_trait::async_trait;
use markpull_core::Cursor;
use serde::Serialize;

const CODE_SEARCH_ENDPOINT: &str = "cises/search";
const DOCUMENT_LIST_ENDPOINT: &str = "documents/search";

/// A paginated endpoint bound to one filter.
///
/// Fetching is idempotent for a given cursor and has no side effects beyond
/// the network call.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    /// Record type returned on each page.
    type Record: PagedRecord;

    /// Maximum number of records a page may hold.
    fn page_size(&self) -> usize;

    /// Fetch the page after `cursor`, or the first page when `cursor` is `None`.
    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page<Self::Record>>;
}

/// Paginated marking code search.
#[derive(Debug, Clone)]
pub struct CodeSearchClient {
    session: Session,
    filter: SearchFilter,
}

impl CodeSearchClient {
    /// Bind a code search to a session and filter.
    #[must_use]
    pub fn new(session: Session, filter: SearchFilter) -> Self {
        Self { session, filter }
    }
}

#[derive(Debug, Serialize)]
struct CodeSearchRequest<'a> {
    filter: &'a SearchFilter,
    pagination: CodePagination<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CodePagination<'a> {
    per_page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_emission_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sgtin: Option<&'a str>,
    direction: u8,
}

#[async_trait]
impl PageSource for CodeSearchClient {
    type Record = CodeRecord;

    fn page_size(&self) -> usize {
        self.session.page_size()
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page<CodeRecord>> {
        let body = CodeSearchRequest {
            filter: &self.filter,
            pagination: CodePagination {
                per_page: self.page_size(),
                last_emission_date: cursor.and_then(|c| c.get("emission_date")),
                sgtin: cursor.and_then(|c| c.get("cis")),
                direction: 0,
            },
        };

        tracing::debug!(endpoint = CODE_SEARCH_ENDPOINT, cursor = ?cursor, "requesting page");

        let response: CodeSearchResponse = self
            .session
            .execute(
                CODE_SEARCH_ENDPOINT,
                self.session.post(CODE_SEARCH_ENDPOINT).json(&body),
            )
            .await?;

        validate_page(CODE_SEARCH_ENDPOINT, &response.result, self.page_size())?;

        Ok(Page {
            records: response.result,
            is_last_page: response.is_last_page,
        })
    }
}

/// Paginated business document list.
#[derive(Debug, Clone)]
pub struct DocumentListClient {
    session: Session,
    filter: SearchFilter,
}

impl DocumentListClient {
    /// Bind a document list to a session and filter.
    #[must_use]
    pub fn new(session: Session, filter: SearchFilter) -> Self {
        Self { session, filter }
    }
}

#[derive(Debug, Serialize)]
struct DocumentListRequest<'a> {
    filter: &'a SearchFilter,
    pagination: DocumentPagination<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPagination<'a> {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_doc_date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_doc_id: Option<&'a str>,
}

#[async_trait]
impl PageSource for DocumentListClient {
    type Record = DocumentSummary;

    fn page_size(&self) -> usize {
        self.session.page_size()
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Page<DocumentSummary>> {
        let body = DocumentListRequest {
            filter: &self.filter,
            pagination: DocumentPagination {
                limit: self.page_size(),
                last_doc_date: cursor.and_then(|c| c.get("doc_date")),
                last_doc_id: cursor.and_then(|c| c.get("doc_id")),
            },
        };

        tracing::debug!(endpoint = DOCUMENT_LIST_ENDPOINT, cursor = ?cursor, "requesting page");

        let response: DocumentListResponse = self
            .session
            .execute(
                DOCUMENT_LIST_ENDPOINT,
                self.session.post(DOCUMENT_LIST_ENDPOINT).json(&body),
            )
            .await?;

        validate_page(DOCUMENT_LIST_ENDPOINT, &response.results, self.page_size())?;

        Ok(Page {
            records: response.results,
            is_last_page: response.is_last_page,
        })
    }
}
