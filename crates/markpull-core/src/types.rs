//! Shared types used across the Markpull application.
//!
//! This module defines common newtypes that provide type safety
//! and clear domain modeling.

use crate::error::MarkpullError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Identifier of a single acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Create a new random `RunId` using UUID v4.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for top-level unit (document) identifiers.
///
/// Unit IDs are persisted one per line in the processed-unit ledger, so they
/// must be non-empty and free of whitespace and control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

impl UnitId {
    /// Create a new `UnitId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, MarkpullError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), MarkpullError> {
        static UNIT_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = UNIT_REGEX
            .get_or_init(|| Regex::new(r"^[^\s\x00-\x1f]{1,256}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(MarkpullError::Validation(format!(
                "invalid unit ID: must be 1-256 visible characters without whitespace, got '{id}'"
            )))
        }
    }
}

impl TryFrom<String> for UnitId {
    type Error = MarkpullError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque continuation key for paginated requests.
///
/// Built from the natural ordering fields of the last record on a page.
/// Only the pagination client that produced it knows which fields matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(BTreeMap<String, String>);

impl Cursor {
    /// Create an empty cursor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ordering field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Look up an ordering field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_valid() {
        let id = UnitId::new("b3f1c2d4-0000-4e1a-9a1b-2c3d4e5f6a7b").expect("valid unit ID");
        assert_eq!(id.as_str(), "b3f1c2d4-0000-4e1a-9a1b-2c3d4e5f6a7b");
        assert_eq!(id.to_string(), "b3f1c2d4-0000-4e1a-9a1b-2c3d4e5f6a7b");
    }

    #[test]
    fn test_unit_id_rejects_whitespace() {
        assert!(UnitId::new("").is_err());
        assert!(UnitId::new("doc 1").is_err());
        assert!(UnitId::new("doc\n1").is_err());
        assert!(UnitId::new("doc\t1").is_err());
    }

    #[derive(Deserialize)]
    struct Wrapper {
        id: UnitId,
    }

    #[test]
    fn test_unit_id_deserialize_validates() {
        let parsed: Wrapper = toml::from_str("id = \"DOC-42\"").expect("parse unit id");
        assert_eq!(parsed.id.as_str(), "DOC-42");

        let bad = toml::from_str::<Wrapper>("id = \"has space\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_cursor_fields() {
        let cursor = Cursor::new()
            .with("emission_date", "2024-05-01T10:00:00Z")
            .with("cis", "0104600000000000215abc");
        assert_eq!(cursor.get("cis"), Some("0104600000000000215abc"));
        assert_eq!(cursor.get("missing"), None);
        assert_eq!(
            cursor.to_string(),
            "cis=0104600000000000215abc,emission_date=2024-05-01T10:00:00Z"
        );
    }

    #[test]
    fn test_run_id_unique() {
        assert_ne!(RunId::generate(), RunId::generate());
    }
}
