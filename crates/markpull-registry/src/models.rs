//! Typed records for each registry endpoint.
//!
//! Wire envelopes are decoded with serde and then validated, so a body that
//! parses but is still nonsense (blank identifiers, oversized pages, a detail
//! answer for the wrong document) surfaces as a protocol error instead of
//! leaking into the accumulated result.

use crate::error::{RegistryError, Result};
use chrono::{DateTime, Utc};
use markpull_core::{Cursor, UnitId};
use serde::{Deserialize, Serialize};

/// A record that can be accumulated and exported.
pub trait Record: Clone + Send + Sync + 'static {
    /// Unique identifier used for deduplication.
    fn record_id(&self) -> &str;

    /// Cross-reference key counted as distinct (product code).
    fn secondary_key(&self) -> Option<&str>;
}

/// A record type produced by a paginated endpoint.
pub trait PagedRecord: Record {
    /// Continuation key pointing just past this record.
    fn cursor(&self) -> Cursor;
}

/// Filter criteria forwarded verbatim to the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchFilter(serde_json::Value);

impl SearchFilter {
    /// Wrap an arbitrary JSON filter object.
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Parse a filter from JSON text.
    ///
    /// # Errors
    /// Returns error if the text is not a JSON object.
    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let value: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        Ok(Self(serde_json::Value::Object(value)))
    }

    /// The raw filter value.
    #[must_use]
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<R> {
    /// Records on this page, at most the page size
    pub records: Vec<R>,
    /// Server says there is nothing after this page
    pub is_last_page: bool,
}

impl<R: PagedRecord> Page<R> {
    /// Cursor for the following page, if one should be requested.
    ///
    /// A successor exists only for a full page that the server did not mark
    /// as last.
    #[must_use]
    pub fn successor(&self, page_size: usize) -> Option<Cursor> {
        if self.is_last_page || self.records.len() < page_size {
            return None;
        }
        self.records.last().map(PagedRecord::cursor)
    }
}

/// A marking code returned by the code search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRecord {
    /// Identification code
    #[serde(rename = "sgtin")]
    pub cis: String,
    /// Product code
    pub gtin: Option<String>,
    /// Product name
    #[serde(default)]
    pub product_name: Option<String>,
    /// Circulation status
    pub status: String,
    /// Owner taxpayer number
    #[serde(default)]
    pub owner_inn: Option<String>,
    /// Emission timestamp
    pub emission_date: DateTime<Utc>,
    /// Emission type (local, import, remark)
    #[serde(default)]
    pub emission_type: Option<String>,
}

impl Record for CodeRecord {
    fn record_id(&self) -> &str {
        &self.cis
    }

    fn secondary_key(&self) -> Option<&str> {
        self.gtin.as_deref()
    }
}

impl PagedRecord for CodeRecord {
    fn cursor(&self) -> Cursor {
        Cursor::new()
            .with("emission_date", self.emission_date.to_rfc3339())
            .with("cis", self.cis.clone())
    }
}

/// A business document discovered by the document list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    /// Registry-wide document identifier
    #[serde(rename = "docId")]
    pub id: UnitId,
    /// Human-facing document number
    #[serde(default)]
    pub number: Option<String>,
    /// Document date
    pub doc_date: DateTime<Utc>,
    /// Document type code
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Processing status
    pub status: String,
    /// Sender taxpayer number
    #[serde(default)]
    pub sender_inn: Option<String>,
    /// Receiver taxpayer number
    #[serde(default)]
    pub receiver_inn: Option<String>,
}

impl Record for DocumentSummary {
    fn record_id(&self) -> &str {
        self.id.as_str()
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(&self.doc_type)
    }
}

impl PagedRecord for DocumentSummary {
    fn cursor(&self) -> Cursor {
        Cursor::new()
            .with("doc_date", self.doc_date.to_rfc3339())
            .with("doc_id", self.id.as_str())
    }
}

/// A line item of a document, obtained from the detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    /// Stable identifier: document plus code
    pub line_id: String,
    /// Owning document
    pub doc_id: UnitId,
    /// Identification code listed on the line
    pub cis: String,
    /// Product code
    pub gtin: Option<String>,
    /// Product name
    pub product_name: Option<String>,
    /// Line status reported by the registry
    pub status: Option<String>,
}

impl DocumentLine {
    /// Build a line, deriving its identifier from the document and code.
    #[must_use]
    pub fn new(
        doc_id: UnitId,
        cis: String,
        gtin: Option<String>,
        product_name: Option<String>,
        status: Option<String>,
    ) -> Self {
        Self {
            line_id: format!("{doc_id}:{cis}"),
            doc_id,
            cis,
            gtin,
            product_name,
            status,
        }
    }
}

impl Record for DocumentLine {
    fn record_id(&self) -> &str {
        &self.line_id
    }

    fn secondary_key(&self) -> Option<&str> {
        self.gtin.as_deref()
    }
}

/// Wire envelope of the code search endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CodeSearchResponse {
    pub result: Vec<CodeRecord>,
    pub is_last_page: bool,
}

/// Wire envelope of the document list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentListResponse {
    pub results: Vec<DocumentSummary>,
    pub is_last_page: bool,
}

/// Wire envelope of the document detail endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentInfoResponse {
    pub doc_id: String,
    #[serde(default)]
    pub items: Vec<DocumentItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentItem {
    pub cis: String,
    #[serde(default)]
    pub gtin: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Check a decoded page against the limits it must respect.
pub(crate) fn validate_page<R: Record>(
    endpoint: &'static str,
    records: &[R],
    page_size: usize,
) -> Result<()> {
    if records.len() > page_size {
        return Err(RegistryError::Protocol {
            endpoint,
            message: format!(
                "page holds {} records, more than the requested {page_size}",
                records.len()
            ),
        });
    }
    if let Some(position) = records.iter().position(|r| r.record_id().trim().is_empty()) {
        return Err(RegistryError::Protocol {
            endpoint,
            message: format!("record {position} has an empty identifier"),
        });
    }
    Ok(())
}

impl DocumentInfoResponse {
    /// Validate the detail answer and flatten it into line records.
    pub(crate) fn into_lines(
        self,
        endpoint: &'static str,
        unit: &UnitId,
    ) -> Result<Vec<DocumentLine>> {
        if self.doc_id != unit.as_str() {
            return Err(RegistryError::Protocol {
                endpoint,
                message: format!("asked for document {unit}, got {}", self.doc_id),
            });
        }
        self.items
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                if item.cis.trim().is_empty() {
                    return Err(RegistryError::Protocol {
                        endpoint,
                        message: format!("item {position} of document {unit} has no code"),
                    });
                }
                Ok(DocumentLine::new(
                    unit.clone(),
                    item.cis,
                    item.gtin,
                    item.product_name,
                    item.status,
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code(cis: &str) -> CodeRecord {
        CodeRecord {
            cis: cis.to_string(),
            gtin: Some("04600000000001".to_string()),
            product_name: None,
            status: "INTRODUCED".to_string(),
            owner_inn: None,
            emission_date: "2024-05-01T10:00:00Z".parse().expect("timestamp"),
            emission_type: None,
        }
    }

    #[test]
    fn test_successor_only_for_full_non_final_page() {
        let full = Page {
            records: vec![code("a"), code("b")],
            is_last_page: false,
        };
        let cursor = full.successor(2).expect("successor for full page");
        assert_eq!(cursor.get("cis"), Some("b"));

        let short = Page {
            records: vec![code("a")],
            is_last_page: false,
        };
        assert!(short.successor(2).is_none());

        let last = Page {
            records: vec![code("a"), code("b")],
            is_last_page: true,
        };
        assert!(last.successor(2).is_none());

        let empty: Page<CodeRecord> = Page {
            records: vec![],
            is_last_page: false,
        };
        assert!(empty.successor(0).is_none());
    }

    #[test]
    fn test_code_response_decoding() {
        let body = json!({
            "result": [{
                "sgtin": "0104600000000001215abcdef",
                "gtin": "04600000000001",
                "productName": "Кроссовки",
                "status": "INTRODUCED",
                "ownerInn": "7700000000",
                "emissionDate": "2024-05-01T10:00:00Z",
                "emissionType": "LOCAL"
            }],
            "isLastPage": true
        });
        let parsed: CodeSearchResponse = serde_json::from_value(body).expect("decode");
        assert!(parsed.is_last_page);
        assert_eq!(parsed.result[0].record_id(), "0104600000000001215abcdef");
        assert_eq!(parsed.result[0].secondary_key(), Some("04600000000001"));
    }

    #[test]
    fn test_document_summary_rejects_blank_id() {
        let body = json!({
            "results": [{
                "docId": "",
                "docDate": "2024-05-01T10:00:00Z",
                "type": "LP_ACCEPT_GOODS",
                "status": "CHECKED_OK"
            }],
            "isLastPage": true
        });
        assert!(serde_json::from_value::<DocumentListResponse>(body).is_err());
    }

    #[test]
    fn test_validate_page_limits() {
        let records = vec![code("a"), code("b"), code("c")];
        assert!(validate_page("cises/search", &records, 3).is_ok());
        assert!(validate_page("cises/search", &records, 2).is_err());
        assert!(validate_page("cises/search", &[code(" ")], 3).is_err());
    }

    #[test]
    fn test_detail_must_match_unit() {
        let unit = UnitId::new("DOC-1").expect("unit id");
        let response = DocumentInfoResponse {
            doc_id: "DOC-2".to_string(),
            items: vec![],
        };
        assert!(response.into_lines("doc/info", &unit).is_err());

        let response = DocumentInfoResponse {
            doc_id: "DOC-1".to_string(),
            items: vec![DocumentItem {
                cis: "010460000000000121x".to_string(),
                gtin: Some("04600000000001".to_string()),
                product_name: None,
                status: None,
            }],
        };
        let lines = response.into_lines("doc/info", &unit).expect("lines");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].record_id(), "DOC-1:010460000000000121x");
    }

    #[test]
    fn test_filter_from_json() {
        let filter = SearchFilter::from_json(r#"{"gtins":["04600000000001"]}"#).expect("filter");
        assert_eq!(filter.as_value()["gtins"][0], "04600000000001");
        assert!(SearchFilter::from_json("[1,2]").is_err());
    }
}
