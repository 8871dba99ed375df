use crate::PreviewError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Byte-oriented key/value capability backing the preview cache.
///
/// A missing key is `Ok(None)`. Single-key operations are expected to be
/// atomic; nothing beyond that is assumed.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PreviewError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), PreviewError>;
    fn close(&self) -> Result<(), PreviewError>;
}

/// In-process store. Contents live as long as the store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<Vec<u8>, Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::with_capacity(capacity)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<(), PreviewError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PreviewError::StoreError("store is closed".into()));
        }
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PreviewError> {
        self.ensure_open()?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), PreviewError> {
        self.ensure_open()?;
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn close(&self) -> Result<(), PreviewError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::KvStore;
    use crate::PreviewError;
    use rusqlite::{Connection, OptionalExtension};
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::debug;

    fn store_error(e: impl std::fmt::Display) -> PreviewError {
        PreviewError::StoreError(e.to_string())
    }

    /// Durable store in a single SQLite table.
    pub struct SqliteStore {
        conn: Mutex<Option<Connection>>,
    }

    impl SqliteStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, PreviewError> {
            let conn = Connection::open(path.as_ref()).map_err(store_error)?;
            debug!(path = %path.as_ref().display(), "Opened preview store");
            Self::init(conn)
        }

        pub fn open_in_memory() -> Result<Self, PreviewError> {
            Self::init(Connection::open_in_memory().map_err(store_error)?)
        }

        fn init(conn: Connection) -> Result<Self, PreviewError> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS previews (
                    key   BLOB PRIMARY KEY,
                    value BLOB NOT NULL
                )",
            )
            .map_err(store_error)?;
            Ok(Self {
                conn: Mutex::new(Some(conn)),
            })
        }

        fn with_conn<T>(
            &self,
            op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
        ) -> Result<T, PreviewError> {
            let guard = self.conn.lock().map_err(store_error)?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| PreviewError::StoreError("store is closed".into()))?;
            op(conn).map_err(store_error)
        }
    }

    impl KvStore for SqliteStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PreviewError> {
            self.with_conn(|conn| {
                conn.query_row("SELECT value FROM previews WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()
            })
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), PreviewError> {
            self.with_conn(|conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO previews (key, value) VALUES (?1, ?2)",
                    (key, value),
                )
                .map(|_| ())
            })
        }

        fn close(&self) -> Result<(), PreviewError> {
            let mut guard = self.conn.lock().map_err(store_error)?;
            match guard.take() {
                Some(conn) => conn.close().map_err(|(_, e)| store_error(e)),
                None => Ok(()),
            }
        }
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
