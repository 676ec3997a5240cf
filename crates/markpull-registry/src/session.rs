//! Authenticated transport shared by all registry clients.
//!
//! The session is handed in by the caller with a bearer credential already
//! obtained; nothing in this crate performs authentication.

use crate::error::{RegistryError, Result};
use markpull_core::RegistryConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of body bytes quoted back in error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// An authenticated connection to the registry.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl Session {
    /// Build a session from registry settings and a bearer token.
    ///
    /// # Errors
    /// Returns error if the page size is outside what the registry serves,
    /// the token is not a valid header value or the HTTP client cannot be
    /// created.
    pub fn new(config: &RegistryConfig, bearer_token: &str) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RegistryError::Client(e.to_string()))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {bearer_token}"))
            .map_err(|e| RegistryError::Client(format!("invalid bearer token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| RegistryError::Client(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(SessionInner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                page_size: config.page_size,
            }),
        })
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Configured maximum page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    /// Join a relative endpoint path onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    /// Append `segments` to the base URL, percent-encoding each one.
    ///
    /// Unlike [`Session::url`], a `/`, `?` or `#` inside a segment stays part
    /// of that segment.
    pub fn segment_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.inner.base_url)
            .map_err(|e| RegistryError::Client(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RegistryError::Client("base URL cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn get_url(&self, url: Url) -> RequestBuilder {
        self.inner.client.get(url)
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.inner.client.post(self.url(path))
    }

    /// Send a request and decode a JSON body, classifying every failure.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::from_transport(endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            truncate_at_char_boundary(&mut message, ERROR_BODY_LIMIT);
            return Err(RegistryError::from_status(endpoint, status.as_u16(), message));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RegistryError::from_transport(endpoint, &e))?;

        serde_json::from_slice(&body).map_err(|e| RegistryError::Protocol {
            endpoint,
            message: format!("failed to parse response: {e}"),
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.inner.base_url)
            .field("page_size", &self.inner.page_size)
            .finish_non_exhaustive()
    }
}

fn truncate_at_char_boundary(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
