use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod cache;
mod charset;
mod direct;
mod error;
mod extractor;
mod fetcher;
#[cfg(feature = "logging")]
mod logging;
mod normalizer;
mod resolver;
mod store;
mod thumbnail;
#[cfg(feature = "logging")]
mod utils;

pub use cache::PreviewCache;
pub use charset::{decode, resolve_charset};
pub use direct::DirectMediaClassifier;
pub use error::PreviewError;
pub use extractor::{og_type_to_media_type, DocumentPreviewExtractor};
pub use fetcher::{BodyMode, FetchResponse, Fetcher, FetcherConfig, HttpFetch};
#[cfg(feature = "logging")]
pub use logging::{log_error_card, log_preview_card, setup_logging, LogConfig, LogLevelGuard};
pub use normalizer::{NormalizerConfig, UrlNormalizer};
pub use resolver::{LinkResolver, ResolverConfig};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{KvStore, MemoryStore};
pub use thumbnail::{select_thumbnail, ThumbnailCandidate, ThumbnailConfig, ThumbnailDiscovery};

/// Kind of resource a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Image,
    #[default]
    Default,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
            MediaType::Default => "default",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record emitted for a resolved link.
///
/// Field names on the wire are fixed: `Title`, `Type`, `URL`, `ThumbnailURL`,
/// `ContentType`, `ContentLength`. An empty `thumbnail_url` means no thumbnail
/// was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Type")]
    pub media_type: MediaType,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "ThumbnailURL")]
    pub thumbnail_url: String,
    #[serde(rename = "ContentType")]
    pub content_type: String,
    #[serde(rename = "ContentLength")]
    pub content_length: i64,
}

impl Preview {
    pub fn to_bytes(&self) -> Result<Vec<u8>, PreviewError> {
        serde_json::to_vec(self).map_err(|e| PreviewError::SerializationError(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreviewError> {
        serde_json::from_slice(bytes).map_err(|e| PreviewError::SerializationError(e.to_string()))
    }
}

#[async_trait]
pub trait PreviewGenerator {
    async fn generate_preview(&self, url: &str) -> Result<Preview, PreviewError>;
}
