use crate::charset;
use crate::fetcher::{BodyMode, HttpFetch};
use crate::normalizer::UrlNormalizer;
use crate::thumbnail::{self, ThumbnailDiscovery};
use crate::{MediaType, Preview};
use encoding_rs::UTF_8;
use scraper::{Html, Selector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

const VIDEO_KEYWORDS: &[&str] = &["video", "player", "coub", "tv", "movie", "episode"];
const AUDIO_KEYWORDS: &[&str] = &[
    "music", "audio", "song", "album", "band", "playlist", "radio", "sound",
];

/// Maps an `og:type` (or `twitter:card`) value to a media type.
///
/// Video keywords are checked before audio ones; any other non-empty value is
/// `Default`. Empty input yields `None` so the caller can try another tag.
pub fn og_type_to_media_type(og_type: &str) -> Option<MediaType> {
    let og_type = og_type.trim().to_lowercase();
    if og_type.is_empty() {
        return None;
    }

    if VIDEO_KEYWORDS.iter().any(|k| og_type.contains(k)) {
        Some(MediaType::Video)
    } else if AUDIO_KEYWORDS.iter().any(|k| og_type.contains(k)) {
        Some(MediaType::Audio)
    } else {
        Some(MediaType::Default)
    }
}

/// Everything read from the parsed document. `Html` is not `Send`, so the
/// tree is reduced to this before any network work resumes.
#[derive(Debug, Default)]
struct DocumentMetadata {
    media_type: MediaType,
    title: String,
    meta_thumbnail: Option<String>,
    candidates: Vec<Url>,
}

fn meta_content(document: &Html, key: &str) -> Option<String> {
    let selector =
        Selector::parse(&format!(r#"meta[property="{key}"], meta[name="{key}"]"#)).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn element_text(document: &Html, tag: &str) -> Option<String> {
    let selector = Selector::parse(tag).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolves entities left over after parsing, e.g. from double-escaped
/// attribute values. Text is never dropped, only entities decoded.
fn unescape_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).trim().to_string()
}

/// Parses the body, transcoding it first when the document declares a
/// charset other than UTF-8.
fn parse_document(body: &[u8], content_type: &str) -> Html {
    let document = Html::parse_document(&String::from_utf8_lossy(body));
    let Some(label) = charset::resolve_charset(content_type, &document) else {
        return document;
    };

    match encoding_rs::Encoding::for_label(label.as_bytes()) {
        Some(encoding) if encoding != UTF_8 => {
            debug!(charset = %label, "Transcoding document");
            Html::parse_document(&charset::decode(body, Some(&label)))
        }
        _ => document,
    }
}

fn read_metadata(
    document: &Html,
    base: &Url,
    normalizer: &UrlNormalizer,
    discovery: &ThumbnailDiscovery,
) -> DocumentMetadata {
    let media_type = meta_content(document, "og:type")
        .and_then(|t| og_type_to_media_type(&t))
        .or_else(|| meta_content(document, "twitter:card").and_then(|t| og_type_to_media_type(&t)))
        .unwrap_or_default();

    let title = meta_content(document, "og:title")
        .or_else(|| meta_content(document, "twitter:title"))
        .or_else(|| element_text(document, "title"))
        .or_else(|| meta_content(document, "og:description"))
        .or_else(|| meta_content(document, "twitter:description"))
        .or_else(|| element_text(document, "description"))
        .map(|t| unescape_entities(&t))
        .unwrap_or_default();

    let meta_thumbnail =
        meta_content(document, "og:image").or_else(|| meta_content(document, "twitter:image"));

    let candidates =
        thumbnail::collect_candidates(document, base, normalizer, discovery.config());

    DocumentMetadata {
        media_type,
        title,
        meta_thumbnail,
        candidates,
    }
}

/// Builds previews for HTML documents.
#[derive(Clone)]
pub struct DocumentPreviewExtractor {
    fetcher: Arc<dyn HttpFetch>,
    normalizer: UrlNormalizer,
    discovery: ThumbnailDiscovery,
}

impl DocumentPreviewExtractor {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        normalizer: UrlNormalizer,
        discovery: ThumbnailDiscovery,
    ) -> Self {
        Self {
            fetcher,
            normalizer,
            discovery,
        }
    }

    #[instrument(level = "debug", skip(self, url, cancel), fields(url = %url))]
    pub async fn extract(&self, url: &Url, cancel: &CancellationToken) -> Option<Preview> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return None,
            response = self.fetcher.fetch(url, &[], BodyMode::Full) => response.ok()?,
        };

        let content_type = response.content_type().to_string();
        // relative links resolve against the post-redirect location
        let base = response.url.clone();

        let metadata = {
            let document = parse_document(&response.body, &content_type);
            read_metadata(&document, &base, &self.normalizer, &self.discovery)
        };
        debug!(
            title = %metadata.title,
            media_type = %metadata.media_type,
            candidates = metadata.candidates.len(),
            "Document metadata extracted"
        );

        let mut thumbnail = None;
        if let Some(raw) = metadata.meta_thumbnail.as_deref() {
            if let Ok(image) = self.normalizer.normalize(raw, Some(&base)) {
                let (location, content_length) = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    probed = self.discovery.probe(&image) => probed,
                };
                if content_length > 0 {
                    thumbnail = Some((location.to_string(), content_length));
                }
            }
        }

        if thumbnail.is_none() {
            thumbnail = self
                .discovery
                .discover(metadata.candidates, cancel)
                .await
                .map(|candidate| (candidate.url, candidate.content_length));
        }

        let (thumbnail_url, content_length) = thumbnail.unwrap_or_default();

        Some(Preview {
            title: metadata.title,
            media_type: metadata.media_type,
            url: url.to_string(),
            thumbnail_url,
            content_type,
            content_length,
        })
    }
}
