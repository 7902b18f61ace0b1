#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP page fetching and paginated rendering for listing scrapers.
//!
//! Provides the [`PageFetcher`] trait with a retrying [`HttpFetcher`]
//! implementation, and the [`render::Renderer`] trait that abstracts the
//! "browser" a results page is driven through. [`render::PagerRenderer`]
//! implements that trait on top of any [`PageFetcher`] by following pager
//! links instead of clicking buttons in a real browser.
//!
//! This crate knows nothing about listings; it moves markup around and
//! leaves interpretation to callers.

pub mod render;
pub mod retry;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

/// Browser-like user agent sent with every request by default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36";

/// Errors that can occur while fetching or rendering pages.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// An HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Numeric status code.
        status: u16,
    },

    /// A selector, URL or document could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP settings shared by every fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Value of the `User-Agent` header.
    pub user_agent: String,
    /// Additional HTTP headers to include in requests.
    pub headers: BTreeMap<String, String>,
    /// Upper bound on a whole request, connect through body.
    pub timeout: Duration,
    /// Upper bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Retry attempts for transient failures after the first try.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one.
    pub base_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            max_retries: 2,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl FetchConfig {
    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries for transient failures.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub const fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Overrides the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        user_agent.clone_into(&mut self.user_agent);
        self
    }

    /// Adds an HTTP header to include in requests.
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Builds a [`reqwest::Client`] with the configured headers and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Parse`] for an invalid header and
    /// [`ScrapeError::Http`] if the client cannot be constructed.
    pub fn build_client(&self) -> Result<reqwest::Client, ScrapeError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, value) in &self.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ScrapeError::Parse(format!("invalid header name '{key}': {e}")))?;
            let val = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| ScrapeError::Parse(format!("invalid header value '{value}': {e}")))?;
            header_map.insert(name, val);
        }
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(header_map)
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(ScrapeError::Http)
    }
}

/// Something that can turn a URL into the text of the page behind it.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the page cannot be fetched.
    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError>;
}

/// [`PageFetcher`] backed by a shared [`reqwest::Client`] with retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: retry::RetryPolicy,
}

impl HttpFetcher {
    /// Creates a fetcher from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError`] if the HTTP client cannot be built.
    pub fn new(config: &FetchConfig) -> Result<Self, ScrapeError> {
        Ok(Self {
            client: config.build_client()?,
            policy: retry::RetryPolicy {
                max_retries: config.max_retries,
                base_backoff: config.base_backoff,
            },
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, ScrapeError> {
        log::debug!("GET {url}");
        retry::send_text(|| self.client.get(url), &self.policy).await
    }
}
