//! Blocking HTTP transport.
//!
//! The scraping core only sees the [`Fetcher`] capability: a body on success,
//! `None` on any transport failure. Headers are passed per call through
//! [`RequestOptions`] so concurrent callers never share mutable header state.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, REFERER};
use thiserror::Error;
use tracing::debug;

use crate::retry::{retry, RetryConfig};

/// Transport failures. They never cross the [`Fetcher`] boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Empty response body from {0}")]
    EmptyBody(String),
}

/// Per-request header overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub accept: String,
    pub referer: Option<String>,
    /// Send `X-Requested-With: XMLHttpRequest`
    pub xhr: bool,
}

impl RequestOptions {
    /// Paginated JSON feed, requested the way the calendar page's script does
    pub fn calendar_feed(referer: impl Into<String>) -> Self {
        Self {
            accept: "application/json, text/plain, */*".to_string(),
            referer: Some(referer.into()),
            xhr: true,
        }
    }

    /// Full HTML document navigation
    pub fn html_page(referer: impl Into<String>) -> Self {
        Self {
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            referer: Some(referer.into()),
            xhr: false,
        }
    }

    pub fn stylesheet(referer: impl Into<String>) -> Self {
        Self {
            accept: "text/css,*/*;q=0.1".to_string(),
            referer: Some(referer.into()),
            xhr: false,
        }
    }

    pub fn font(referer: impl Into<String>) -> Self {
        Self {
            accept: "font/woff,*/*;q=0.1".to_string(),
            referer: Some(referer.into()),
            xhr: false,
        }
    }
}

/// Fetch capability consumed by the scrapers
pub trait Fetcher: Send + Sync {
    /// Body text of a successful, non-blank response
    fn fetch_text(&self, url: &str, options: &RequestOptions) -> Option<String>;

    /// Raw body of a successful, non-empty response
    fn fetch_bytes(&self, url: &str, options: &RequestOptions) -> Option<Vec<u8>>;
}

/// `reqwest` backed fetcher with a fixed timeout
pub struct HttpFetcher {
    client: Client,
    retry: RetryConfig,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str, max_retries: u32) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            retry: RetryConfig {
                max_retries,
                ..RetryConfig::network()
            },
        })
    }

    fn get(&self, url: &str, options: &RequestOptions) -> Result<Response, FetchError> {
        let url = with_scheme(url);
        retry(&self.retry, "GET", || -> Result<Response, FetchError> {
            let mut request = self.client.get(&url).header(ACCEPT, &options.accept);
            if let Some(referer) = &options.referer {
                request = request.header(REFERER, referer);
            }
            if options.xhr {
                request = request.header("X-Requested-With", "XMLHttpRequest");
            }

            let response = request.send()?;
            if !response.status().is_success() {
                return Err(FetchError::Status {
                    status: response.status().as_u16(),
                    url: url.clone(),
                });
            }
            Ok(response)
        })
    }

    fn try_text(&self, url: &str, options: &RequestOptions) -> Result<String, FetchError> {
        let text = self.get(url, options)?.text()?;
        if text.trim().is_empty() {
            return Err(FetchError::EmptyBody(url.to_string()));
        }
        Ok(text)
    }

    fn try_bytes(&self, url: &str, options: &RequestOptions) -> Result<Vec<u8>, FetchError> {
        let bytes = self.get(url, options)?.bytes()?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody(url.to_string()));
        }
        Ok(bytes.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_text(&self, url: &str, options: &RequestOptions) -> Option<String> {
        match self.try_text(url, options) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("fetch_text {} failed: {}", url, e);
                None
            }
        }
    }

    fn fetch_bytes(&self, url: &str, options: &RequestOptions) -> Option<Vec<u8>> {
        match self.try_bytes(url, options) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("fetch_bytes {} failed: {}", url, e);
                None
            }
        }
    }
}

/// Promote protocol-relative URLs (`//host/path`) to https
pub fn with_scheme(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}
