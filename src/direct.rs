use crate::fetcher::{BodyMode, HttpFetch};
use crate::{MediaType, Preview};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpeg", "jpg", "gif", "bmp", "webp", "wbmp", "ico"];
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "3gpp", "3gpp2", "wmv", "asf", "mkv", "mp2ts", "avi", "webm",
];
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "wav", "amr", "awb", "ogg", "acc", "mka", "flac",
];

/// Headers sent with lightweight probes
pub(crate) const PROBE_HEADERS: &[(&str, &str)] = &[("Accept-Encoding", "*")];

/// Lower-cased extension of the last path segment, without the dot.
pub(crate) fn path_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    segment.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

fn last_segment_title(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .or_else(|| url.host_str())
        .unwrap_or_default();

    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Decides the media type of a link from its `Content-Type` and extension.
///
/// Returns `None` when the link is not a direct resource, i.e. the content
/// type is set, is not `application/*`, and is not image, video, or audio.
pub fn classify_media(url: &Url, content_type: &str) -> Option<MediaType> {
    let content_type = content_type.trim().to_lowercase();

    for (prefix, media_type) in [
        ("image/", MediaType::Image),
        ("video/", MediaType::Video),
        ("audio/", MediaType::Audio),
    ] {
        if content_type.starts_with(prefix) {
            return Some(media_type);
        }
    }

    if !content_type.is_empty() && !content_type.starts_with("application/") {
        return None;
    }

    let ext = path_extension(url);
    let media_type = [
        (IMAGE_EXTENSIONS, MediaType::Image),
        (VIDEO_EXTENSIONS, MediaType::Video),
        (AUDIO_EXTENSIONS, MediaType::Audio),
    ]
    .into_iter()
    .find(|(table, _)| ext.as_deref().is_some_and(|ext| table.contains(&ext)))
    .map(|(_, media_type)| media_type)
    .unwrap_or_default();

    Some(media_type)
}

/// Recognizes links that point straight at a media resource.
#[derive(Clone)]
pub struct DirectMediaClassifier {
    fetcher: Arc<dyn HttpFetch>,
}

impl DirectMediaClassifier {
    pub fn new(fetcher: Arc<dyn HttpFetch>) -> Self {
        Self { fetcher }
    }

    #[instrument(level = "debug", skip(self, url), fields(url = %url))]
    pub async fn classify(&self, url: &Url) -> Option<Preview> {
        let response = self
            .fetcher
            .fetch(url, PROBE_HEADERS, BodyMode::HeadersOnly)
            .await
            .ok()?;

        let content_type = response.content_type().to_lowercase();
        let media_type = classify_media(url, &content_type)?;
        debug!(media_type = %media_type, content_type = %content_type, "Direct link detected");

        Some(Preview {
            title: last_segment_title(url),
            media_type,
            url: url.to_string(),
            thumbnail_url: if media_type == MediaType::Image {
                url.to_string()
            } else {
                String::new()
            },
            content_type,
            content_length: response.content_length().unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_content_type_prefix() {
        let u = url("https://example.com/stream");
        assert_eq!(classify_media(&u, "image/png"), Some(MediaType::Image));
        assert_eq!(classify_media(&u, "Video/MP4"), Some(MediaType::Video));
        assert_eq!(classify_media(&u, "audio/mpeg"), Some(MediaType::Audio));
    }

    #[test]
    fn test_extension_fallback_is_case_insensitive() {
        for link in ["https://example.com/PIC.JPG", "https://example.com/pic.jpg"] {
            assert_eq!(
                classify_media(&url(link), "application/octet-stream"),
                Some(MediaType::Image)
            );
            assert_eq!(classify_media(&url(link), ""), Some(MediaType::Image));
        }
        assert_eq!(
            classify_media(&url("https://example.com/clip.webm"), ""),
            Some(MediaType::Video)
        );
        assert_eq!(
            classify_media(&url("https://example.com/song.flac"), "application/x-flac"),
            Some(MediaType::Audio)
        );
    }

    #[test]
    fn test_untyped_application_link_is_default() {
        assert_eq!(
            classify_media(&url("https://example.com/file.zip"), "application/zip"),
            Some(MediaType::Default)
        );
    }

    #[test]
    fn test_html_is_not_direct() {
        assert_eq!(
            classify_media(&url("https://example.com/pic.jpg"), "text/html; charset=utf-8"),
            None
        );
    }

    #[test]
    fn test_title_is_decoded_last_segment() {
        assert_eq!(
            last_segment_title(&url("https://example.com/a/My%20Photo.png")),
            "My Photo.png"
        );
        assert_eq!(last_segment_title(&url("https://example.com/")), "example.com");
    }
}
