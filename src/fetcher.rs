use crate::PreviewError;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_3) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/43.0.2357.81 Safari/537.36";

/// How much of the response the caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Read the whole body.
    Full,
    /// Only status and headers; the body is dropped unread.
    HeadersOnly,
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Effective URL after following redirects
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    /// Empty for `BodyMode::HeadersOnly`
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw `Content-Type` header, empty when absent.
    pub fn content_type(&self) -> &str {
        self.header(CONTENT_TYPE.as_str()).unwrap_or_default()
    }

    /// Declared `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<i64> {
        self.header(CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse::<i64>().ok())
    }
}

/// Outbound HTTP seam shared by every stage of the pipeline.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        extra_headers: &[(&str, &str)],
        mode: BodyMode,
    ) -> Result<FetchResponse, PreviewError>;
}

/// Fetcher configuration
///
/// # Examples
/// ```ignore
/// let fetcher = Fetcher::new_with_config(FetcherConfig {
///     user_agent: "my-custom-agent/1.0".to_string(),
///     timeout: Duration::from_secs(20),
///     ..Default::default()
/// });
/// ```
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_redirects: usize,
    /// Sent with every request, before per-call headers
    pub headers: Option<HeaderMap>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            headers: None,
        }
    }
}

/// reqwest-backed fetcher. Every call gets its own client and cookie jar, so
/// no cookies leak between requests, and the connection is closed afterwards.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new() -> Self {
        debug!("Fetcher initialized with default configuration");
        Self::default()
    }

    pub fn new_with_config(config: FetcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    fn build_client(&self) -> Result<Client, PreviewError> {
        let mut headers = self.config.headers.clone().unwrap_or_default();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .timeout(self.config.timeout)
            .redirect(reqwest::redirect::Policy::limited(self.config.max_redirects))
            .cookie_provider(Arc::new(Jar::default()))
            .default_headers(headers)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| PreviewError::FetchError(format!("Failed to create HTTP client: {e}")))
    }
}

#[async_trait]
impl HttpFetch for Fetcher {
    #[instrument(level = "debug", skip(self, url, extra_headers), fields(url = %url), err)]
    async fn fetch(
        &self,
        url: &Url,
        extra_headers: &[(&str, &str)],
        mode: BodyMode,
    ) -> Result<FetchResponse, PreviewError> {
        let client = self.build_client()?;

        let mut request = client.get(url.clone());
        for (name, value) in extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PreviewError::FetchError(format!("Invalid header name: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| PreviewError::FetchError(format!("Invalid header value: {e}")))?;
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, url = %url, "Failed to send request");
            PreviewError::from(e)
        })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            let message = format!("Status for link {url} is {status}");
            warn!(status = %status, url = %url, "Unexpected response status");
            return Err(PreviewError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = match mode {
            BodyMode::Full => response
                .bytes()
                .await
                .map_err(|e| {
                    warn!(error = %e, url = %url, "Failed to read response body");
                    PreviewError::from(e)
                })?
                .to_vec(),
            BodyMode::HeadersOnly => Vec::new(),
        };

        debug!(
            url = %url,
            final_url = %final_url,
            body_length = body.len(),
            "Fetched link"
        );

        Ok(FetchResponse {
            url: final_url,
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
