//! HTTP client for page and discovery fetches.

use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::config::Limits;
use crate::url_utils;

/// Outcome of a page fetch. `body` is populated only for HTML responses;
/// non-HTML URLs are still marked crawled so they are not re-attempted.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Post-redirect URL the body was served from.
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_content_size: usize,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        Self::with_content_limit(user_agent, Limits::MAX_CONTENT_SIZE)
    }

    pub fn with_content_limit(user_agent: &str, max_content: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(Limits::FETCH_TIMEOUT_SECS))
            .pool_max_idle_per_host(Limits::POOL_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(Limits::POOL_IDLE_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            // Redirects are followed transparently; the caller sees the
            // post-redirect URL on the result.
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            max_content_size: max_content,
        })
    }

    /// Fetch one page. Redirects are followed; 4xx/5xx terminal statuses
    /// are errors; non-HTML content types yield an empty body.
    #[tracing::instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let mut final_url = response.url().clone();
        final_url.set_fragment(None);

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        let is_html = content_type
            .as_deref()
            .map(url_utils::is_html_content_type)
            .unwrap_or(false);

        if !is_html {
            return Ok(FetchedPage {
                final_url,
                status: status.as_u16(),
                content_type,
                body: None,
            });
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_content_size {
                return Err(FetchError::ContentTooLarge(
                    length as usize,
                    self.max_content_size,
                ));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;
        if body.len() > self.max_content_size {
            return Err(FetchError::ContentTooLarge(
                body.len(),
                self.max_content_size,
            ));
        }

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body: Some(body),
        })
    }

    /// Fetch a discovery resource (robots.txt, sitemap XML) as text.
    /// Only a 200 counts as found.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/plain,application/xml,text/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;
        if body.len() > self.max_content_size {
            return Err(FetchError::ContentTooLarge(
                body.len(),
                self.max_content_size,
            ));
        }

        Ok(body)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timeout")]
    Timeout,

    #[error("DNS resolution failed")]
    Dns,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("TLS error")]
    Tls,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("content too large: {0} bytes (max {1})")]
    ContentTooLarge(usize, usize),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl FetchError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return FetchError::Timeout;
        }

        let message = error.to_string().to_lowercase();
        if error.is_connect() {
            if message.contains("connection refused") {
                return FetchError::ConnectionRefused;
            }
            if message.contains("dns")
                || message.contains("name resolution")
                || message.contains("no such host")
            {
                return FetchError::Dns;
            }
        }

        if message.contains("certificate") || message.contains("ssl") || message.contains("tls") {
            return FetchError::Tls;
        }

        FetchError::Network(error.to_string())
    }

    /// Discovery fetches retry on transient failures only.
    pub fn retryable(&self) -> bool {
        match self {
            FetchError::Timeout
            | FetchError::Dns
            | FetchError::ConnectionRefused
            | FetchError::Network(_) => true,
            FetchError::HttpStatus(code) => (500..=599).contains(code),
            _ => false,
        }
    }
}
