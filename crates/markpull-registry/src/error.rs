//! Error types for the registry client.

use thiserror::Error;

/// Errors returned by registry requests.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Rate limiting, server-side failure or a transport hiccup; worth one retry
    #[error("transient registry failure on {endpoint} (status {status:?}): {message}")]
    Transient {
        /// Endpoint that failed
        endpoint: &'static str,
        /// HTTP status code, absent for transport failures
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Any other non-success HTTP status
    #[error("registry rejected request to {endpoint}: status {status}, {message}")]
    Fatal {
        /// Endpoint that failed
        endpoint: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("malformed response from {endpoint}: {message}")]
    Protocol {
        /// Endpoint that returned the body
        endpoint: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// HTTP client could not be constructed
    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

impl RegistryError {
    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(endpoint: &'static str, status: u16, message: String) -> Self {
        if status == 429 || (500..600).contains(&status) {
            Self::Transient {
                endpoint,
                status: Some(status),
                message,
            }
        } else {
            Self::Fatal {
                endpoint,
                status,
                message,
            }
        }
    }

    /// Classify a transport-level failure (connect, timeout, truncated body).
    #[must_use]
    pub fn from_transport(endpoint: &'static str, error: &reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(endpoint, status.as_u16(), error.to_string());
        }
        if error.is_decode() {
            return Self::Protocol {
                endpoint,
                message: error.to_string(),
            };
        }
        Self::Transient {
            endpoint,
            status: None,
            message: error.to_string(),
        }
    }

    /// Whether a single retry after a short delay may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether this error must abort the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Protocol { .. })
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(RegistryError::from_status("cises/search", 429, String::new()).is_transient());
        assert!(RegistryError::from_status("cises/search", 500, String::new()).is_transient());
        assert!(RegistryError::from_status("cises/search", 503, String::new()).is_transient());
        assert!(RegistryError::from_status("cises/search", 400, String::new()).is_fatal());
        assert!(RegistryError::from_status("cises/search", 401, String::new()).is_fatal());
        assert!(RegistryError::from_status("cises/search", 404, String::new()).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::Fatal {
            endpoint: "documents/search",
            status: 403,
            message: "Forbidden".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "registry rejected request to documents/search: status 403, Forbidden"
        );

        let err = RegistryError::Protocol {
            endpoint: "cises/search",
            message: "missing field `isLastPage`".to_string(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_transient());
    }
}
