use crate::direct::PROBE_HEADERS;
use crate::fetcher::{BodyMode, HttpFetch};
use crate::normalizer::UrlNormalizer;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

/// Attributes that may carry an image reference, in priority order
const SOURCE_ATTRIBUTES: &[&str] = &["src", "data-baseurl", "data-img", "load_image", "href", "data-src"];
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpeg", ".jpg", ".bmp", ".webp", ".wbmp", ".ico"];

#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// Candidates collected from a document before scanning stops
    pub max_candidates: usize,
    /// Size probes running at the same time
    pub max_concurrent_probes: usize,
    /// Outstanding probes are aborted once this elapses
    pub probe_deadline: Duration,
    /// Accepted width/height ratio range
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            max_concurrent_probes: 10,
            probe_deadline: Duration::from_secs(30),
            min_ratio: 0.5,
            max_ratio: 5.0,
        }
    }
}

/// An image found in a document, with its probed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailCandidate {
    pub url: String,
    pub content_length: i64,
    /// Discovery order, used to break ties
    pub index: usize,
}

/// Picks the candidate with the largest content length. Zero lengths never
/// win; among equal lengths the first discovered wins.
pub fn select_thumbnail<I>(candidates: I) -> Option<ThumbnailCandidate>
where
    I: IntoIterator<Item = ThumbnailCandidate>,
{
    candidates
        .into_iter()
        .filter(|c| c.content_length > 0)
        .max_by(|a, b| {
            a.content_length
                .cmp(&b.content_length)
                .then_with(|| b.index.cmp(&a.index))
        })
}

/// Extension of a raw reference, as the text after the last dot of its final
/// path element (query included).
fn raw_extension(value: &str) -> &str {
    let name = value.rsplit('/').next().unwrap_or(value);
    name.rfind('.').map(|i| &name[i..]).unwrap_or("")
}

fn has_image_extension(value: &str, is_img: bool) -> bool {
    let ext = raw_extension(value).to_lowercase();
    // image URLs without any extension are common on <img> (search engines, CDNs)
    if ext.is_empty() {
        return is_img;
    }
    IMAGE_EXTENSIONS.iter().any(|accepted| ext.starts_with(accepted))
}

fn width_height_ratio(element: &ElementRef<'_>) -> f64 {
    let attr = |name: &str| element.value().attr(name);
    match (attr("width"), attr("height")) {
        (Some(width), Some(height)) => {
            let width = width.trim().parse::<f64>().unwrap_or(0.0);
            let height = height.trim().parse::<f64>().unwrap_or(0.0);
            if height == 0.0 {
                0.0
            } else {
                width / height
            }
        }
        _ => 0.0,
    }
}

fn collect_from(
    document: &Html,
    tag: &str,
    base: &Url,
    normalizer: &UrlNormalizer,
    config: &ThumbnailConfig,
) -> Vec<Url> {
    let Ok(selector) = Selector::parse(tag) else {
        return Vec::new();
    };
    let is_img = tag == "img";
    let mut found = Vec::new();

    for element in document.select(&selector) {
        if found.len() >= config.max_candidates {
            break;
        }

        let ratio = width_height_ratio(&element);
        if ratio > 0.0 && (ratio < config.min_ratio || ratio > config.max_ratio) {
            continue;
        }

        let resolved = SOURCE_ATTRIBUTES
            .iter()
            .filter_map(|name| element.value().attr(name))
            .filter(|value| has_image_extension(value, is_img))
            .find_map(|value| normalizer.normalize(value, Some(base)).ok());

        if let Some(url) = resolved {
            found.push(url);
        }
    }

    found
}

/// Collects thumbnail candidates from `<img>` elements, or from `<link>`
/// elements when no image qualifies.
pub fn collect_candidates(
    document: &Html,
    base: &Url,
    normalizer: &UrlNormalizer,
    config: &ThumbnailConfig,
) -> Vec<Url> {
    let images = collect_from(document, "img", base, normalizer, config);
    if !images.is_empty() {
        return images;
    }
    collect_from(document, "link", base, normalizer, config)
}

/// Effective location of the resource behind `url`, after redirects, and its
/// declared size. The size is 0 when it can't be had.
pub(crate) async fn probe_content_length(fetcher: &dyn HttpFetch, url: &Url) -> (Url, i64) {
    match fetcher.fetch(url, PROBE_HEADERS, BodyMode::HeadersOnly).await {
        Ok(response) => {
            let content_length = response.content_length().unwrap_or(0).max(0);
            (response.url, content_length)
        }
        Err(e) => {
            debug!(url = %url, error = %e, "Thumbnail probe failed");
            (url.clone(), 0)
        }
    }
}

/// Probes candidate images concurrently and picks the largest one.
#[derive(Clone)]
pub struct ThumbnailDiscovery {
    fetcher: Arc<dyn HttpFetch>,
    config: ThumbnailConfig,
}

impl ThumbnailDiscovery {
    pub fn new(fetcher: Arc<dyn HttpFetch>, config: ThumbnailConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub async fn probe(&self, url: &Url) -> (Url, i64) {
        probe_content_length(self.fetcher.as_ref(), url).await
    }

    #[instrument(level = "debug", skip_all, fields(candidates = candidates.len()))]
    pub async fn discover(
        &self,
        candidates: Vec<Url>,
        cancel: &CancellationToken,
    ) -> Option<ThumbnailCandidate> {
        if candidates.is_empty() {
            return None;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let mut probes = JoinSet::new();

        for (index, url) in candidates.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            probes.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let (url, content_length) = probe_content_length(fetcher.as_ref(), &url).await;
                Some(ThumbnailCandidate {
                    url: url.to_string(),
                    content_length,
                    index,
                })
            });
        }

        let deadline = tokio::time::sleep(self.config.probe_deadline);
        tokio::pin!(deadline);

        let mut probed = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    probes.abort_all();
                    return None;
                }
                _ = &mut deadline => {
                    warn!(outstanding = probes.len(), "Thumbnail probe deadline reached");
                    probes.abort_all();
                    break;
                }
                joined = probes.join_next() => match joined {
                    Some(Ok(Some(candidate))) => probed.push(candidate),
                    Some(_) => {}
                    None => break,
                },
            }
        }

        let chosen = select_thumbnail(probed);
        debug!(thumbnail = ?chosen.as_ref().map(|c| &c.url), "Thumbnail discovery finished");
        chosen
    }
}
