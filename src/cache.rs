use crate::store::KvStore;
use crate::PreviewError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Serialized previews keyed by canonical URL.
///
/// Entries are written once and never refreshed or evicted. Store failures
/// are logged and treated as misses so resolution carries on uncached.
#[derive(Clone, Default)]
pub struct PreviewCache {
    store: Option<Arc<dyn KvStore>>,
}

impl PreviewCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub async fn get(&self, canonical_url: &str) -> Option<Vec<u8>> {
        let store = self.store.as_ref()?;
        match store.get(canonical_url.as_bytes()) {
            Ok(Some(bytes)) => {
                debug!(url = %canonical_url, "Cache hit");
                Some(bytes)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(url = %canonical_url, error = %e, "Cache lookup failed, continuing without cache");
                None
            }
        }
    }

    pub async fn set(&self, canonical_url: &str, preview: &[u8]) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.put(canonical_url.as_bytes(), preview) {
            warn!(url = %canonical_url, error = %e, "Failed to store preview");
        }
    }

    pub fn close(&self) -> Result<(), PreviewError> {
        match self.store.as_ref() {
            Some(store) => store.close(),
            None => Ok(()),
        }
    }
}
