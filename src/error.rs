use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    #[error("Can't validate empty link")]
    EmptyLink,

    #[error("Can't resolve relative link without a base URL")]
    NoBaseForRelative,

    #[error("Link is ambiguous: {0}")]
    AmbiguousLink(String),

    #[error("Host is blacklisted: {0}")]
    BlacklistedHost(String),

    #[error("Host can't be converted to ASCII: {0}")]
    InvalidIDNAHost(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to parse URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Failed to fetch content: {0}")]
    FetchError(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Unexpected HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Failed to serialize preview: {0}")]
    SerializationError(String),

    #[error("No preview available for {0}")]
    NoPreviewAvailable(String),

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("Resolver is closed")]
    Closed,
}

impl PreviewError {
    /// Errors raised while validating caller input. These are terminal for a
    /// request and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PreviewError::EmptyLink
                | PreviewError::NoBaseForRelative
                | PreviewError::AmbiguousLink(_)
                | PreviewError::BlacklistedHost(_)
                | PreviewError::InvalidIDNAHost(_)
                | PreviewError::InvalidUrl(_)
                | PreviewError::UrlParseError(_)
        )
    }

    pub fn log(&self) {
        match self {
            PreviewError::EmptyLink
            | PreviewError::NoBaseForRelative
            | PreviewError::AmbiguousLink(_)
            | PreviewError::InvalidUrl(_) => {
                warn!(error = %self, "Link validation failed");
            }
            PreviewError::UrlParseError(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            PreviewError::BlacklistedHost(host) => {
                warn!(host = %host, "Rejected blacklisted host");
            }
            PreviewError::InvalidIDNAHost(host) => {
                warn!(host = %host, "IDNA conversion failed");
            }
            PreviewError::FetchError(e) => {
                error!(error = %e, "Content fetch failed");
            }
            PreviewError::Timeout(e) => {
                warn!(error = %e, "Request timed out");
            }
            PreviewError::HttpStatus { status, message } => {
                warn!(status = %status, error = %message, "Unexpected response status");
            }
            PreviewError::StoreError(e) => {
                warn!(error = %e, "Store operation failed");
            }
            PreviewError::SerializationError(e) => {
                error!(error = %e, "Preview serialization failed");
            }
            PreviewError::NoPreviewAvailable(url) => {
                warn!(url = %url, "No preview could be produced");
            }
            PreviewError::Cancelled | PreviewError::Closed => {
                debug!(error = %self, "Resolution stopped");
            }
        }
    }
}

impl From<reqwest::Error> for PreviewError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PreviewError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            PreviewError::HttpStatus {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            PreviewError::FetchError(e.to_string())
        }
    }
}
