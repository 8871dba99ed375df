use crate::cache::PreviewCache;
use crate::direct::DirectMediaClassifier;
use crate::extractor::DocumentPreviewExtractor;
use crate::fetcher::{Fetcher, FetcherConfig, HttpFetch};
use crate::normalizer::{NormalizerConfig, UrlNormalizer};
use crate::thumbnail::{ThumbnailConfig, ThumbnailDiscovery};
use crate::{Preview, PreviewError, PreviewGenerator};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use url::Url;

pub const MAX_CONCURRENT_REQUESTS: usize = 500;

type SharedResolution = Shared<BoxFuture<'static, Result<Vec<u8>, PreviewError>>>;

pub struct ResolverConfig {
    pub fetcher: FetcherConfig,
    pub normalizer: NormalizerConfig,
    pub thumbnail: ThumbnailConfig,
    pub max_concurrent_requests: usize,
    /// Share one in-flight resolution between concurrent requests for the
    /// same canonical URL
    pub coalesce_requests: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            normalizer: NormalizerConfig::default(),
            thumbnail: ThumbnailConfig::default(),
            max_concurrent_requests: MAX_CONCURRENT_REQUESTS,
            coalesce_requests: true,
        }
    }

    pub fn with_fetcher_config(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_normalizer_config(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_blocked_host(mut self, host: impl Into<String>) -> Self {
        self.normalizer = self.normalizer.with_blocked_host(host);
        self
    }

    pub fn with_thumbnail_config(mut self, thumbnail: ThumbnailConfig) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests;
        self
    }

    pub fn with_request_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_requests = enabled;
        self
    }
}

struct Inner {
    normalizer: UrlNormalizer,
    classifier: DirectMediaClassifier,
    extractor: DocumentPreviewExtractor,
    cache: PreviewCache,
    inflight: DashMap<String, (u64, SharedResolution)>,
    next_resolution: AtomicU64,
    coalesce: bool,
    semaphore: Semaphore,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// One caller's share of a coalesced resolution. The map entry goes away
/// when the resolution completes, or when its last waiter is dropped early.
struct InflightWaiter<'a> {
    inflight: &'a DashMap<String, (u64, SharedResolution)>,
    key: String,
    id: u64,
    resolution: SharedResolution,
    finished: bool,
}

impl<'a> InflightWaiter<'a> {
    fn new(
        inflight: &'a DashMap<String, (u64, SharedResolution)>,
        key: String,
        id: u64,
        resolution: SharedResolution,
    ) -> Self {
        Self {
            inflight,
            key,
            id,
            resolution,
            finished: false,
        }
    }

    async fn wait(mut self) -> Result<Vec<u8>, PreviewError> {
        let result = (&mut self.resolution).await;
        self.finished = true;
        result
    }
}

impl Drop for InflightWaiter<'_> {
    fn drop(&mut self) {
        let finished = self.finished;
        self.inflight.remove_if(&self.key, |_, (id, pending)| {
            // the map's handle plus ours means nobody else is waiting
            *id == self.id
                && (finished || pending.strong_count().map_or(true, |count| count <= 2))
        });
    }
}

enum Finished {
    Direct(Option<Preview>),
    Document(Option<Preview>),
}

/// Entry point of the pipeline: turns a raw link into a serialized preview.
///
/// The resolver owns the cache handle it is given and closes it in
/// [`LinkResolver::close`]. Clones share all state.
#[derive(Clone)]
pub struct LinkResolver {
    inner: Arc<Inner>,
}

impl LinkResolver {
    pub fn new(cache: PreviewCache) -> Self {
        Self::new_with_config(ResolverConfig::new(), cache)
    }

    pub fn new_with_config(config: ResolverConfig, cache: PreviewCache) -> Self {
        let fetcher: Arc<dyn HttpFetch> = Arc::new(Fetcher::new_with_config(config.fetcher.clone()));
        Self::with_fetcher(config, fetcher, cache)
    }

    /// Builds a resolver around a custom fetcher; `config.fetcher` is unused.
    pub fn with_fetcher(
        config: ResolverConfig,
        fetcher: Arc<dyn HttpFetch>,
        cache: PreviewCache,
    ) -> Self {
        debug!(
            max_concurrent_requests = config.max_concurrent_requests,
            coalesce = config.coalesce_requests,
            caching = cache.is_enabled(),
            "Initializing LinkResolver"
        );

        let normalizer = UrlNormalizer::new(config.normalizer);
        let discovery = ThumbnailDiscovery::new(Arc::clone(&fetcher), config.thumbnail);

        Self {
            inner: Arc::new(Inner {
                classifier: DirectMediaClassifier::new(Arc::clone(&fetcher)),
                extractor: DocumentPreviewExtractor::new(fetcher, normalizer.clone(), discovery),
                normalizer,
                cache,
                inflight: DashMap::new(),
                next_resolution: AtomicU64::new(0),
                coalesce: config.coalesce_requests,
                semaphore: Semaphore::new(config.max_concurrent_requests.max(1)),
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Resolves `raw` and returns the serialized preview.
    ///
    /// Only invalid input, or a link for which neither a direct media preview
    /// nor a document preview can be built, makes this fail.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, raw: &str) -> Result<Vec<u8>, PreviewError> {
        if self.is_closed() {
            return Err(PreviewError::Closed);
        }

        let _permit = self
            .inner
            .semaphore
            .acquire()
            .await
            .map_err(|_| PreviewError::Closed)?;

        let url = self.inner.normalizer.normalize(raw, None).map_err(|e| {
            e.log();
            e
        })?;
        let key = url.to_string();

        if let Some(cached) = self.inner.cache.get(&key).await {
            return Ok(cached);
        }

        if !self.inner.coalesce {
            return self.clone().resolve_canonical(url).await;
        }

        let waiter = match self.inner.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(url = %key, "Joining in-flight resolution");
                let (id, resolution) = entry.get();
                InflightWaiter::new(&self.inner.inflight, key, *id, resolution.clone())
            }
            Entry::Vacant(entry) => {
                let id = self.inner.next_resolution.fetch_add(1, Ordering::Relaxed);
                let this = self.clone();
                let resolution = async move { this.resolve_canonical(url).await }
                    .boxed()
                    .shared();
                entry.insert((id, resolution.clone()));
                InflightWaiter::new(&self.inner.inflight, key, id, resolution)
            }
        };

        waiter.wait().await
    }

    /// Same as [`LinkResolver::resolve`], returning the typed record.
    pub async fn resolve_preview(&self, raw: &str) -> Result<Preview, PreviewError> {
        let bytes = self.resolve(raw).await?;
        Preview::from_bytes(&bytes)
    }

    /// Stops the resolver: in-flight resolutions end with `Cancelled`, new
    /// ones are refused, and the store is closed. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), PreviewError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing link resolver");
        self.inner.shutdown.cancel();
        self.inner.semaphore.close();
        self.inner.inflight.clear();
        self.inner.cache.close()
    }

    /// Number of canonical URLs currently being resolved.
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    async fn resolve_canonical(self, url: Url) -> Result<Vec<u8>, PreviewError> {
        let key = url.to_string();
        // a racing request may have stored it since our lookup
        if let Some(cached) = self.inner.cache.get(&key).await {
            return Ok(cached);
        }

        let race = self.inner.shutdown.child_token();
        let preview = tokio::select! {
            _ = self.inner.shutdown.cancelled() => return Err(PreviewError::Cancelled),
            preview = self.race(&url, &race) => preview,
        };

        let mut preview = preview.ok_or_else(|| {
            let e = PreviewError::NoPreviewAvailable(key.clone());
            e.log();
            e
        })?;
        preview.url = key.clone();

        let bytes = preview.to_bytes()?;
        self.inner.cache.set(&key, &bytes).await;
        Ok(bytes)
    }

    /// Runs the direct classifier and the document extractor side by side.
    /// A direct result always wins; the document result is used only when
    /// the classifier finds nothing. Whatever is still running once the
    /// outcome is known gets cancelled.
    async fn race(&self, url: &Url, cancel: &CancellationToken) -> Option<Preview> {
        let _cancel_loser = cancel.clone().drop_guard();

        let direct = self.inner.classifier.classify(url);
        let document = self.inner.extractor.extract(url, cancel);
        tokio::pin!(direct, document);

        let first = tokio::select! {
            biased;
            preview = &mut direct => Finished::Direct(preview),
            preview = &mut document => Finished::Document(preview),
        };

        match first {
            Finished::Direct(Some(preview)) => {
                debug!(url = %url, "Direct media link");
                Some(preview)
            }
            Finished::Direct(None) => document.await,
            Finished::Document(preview) => match direct.await {
                Some(direct) => {
                    debug!(url = %url, "Direct media link");
                    Some(direct)
                }
                None => preview,
            },
        }
    }
}

#[async_trait]
impl PreviewGenerator for LinkResolver {
    async fn generate_preview(&self, url: &str) -> Result<Preview, PreviewError> {
        self.resolve_preview(url).await
    }
}
