//! Store lifecycle: opening with pragma configuration, the process-wide
//! shared handle, and teardown.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::OnceCell;
use tokio_rusqlite::Connection;

use super::schema;
use crate::Error;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA busy_timeout=5000;";

static SHARED: OnceCell<BlobStore> = OnceCell::const_new();

/// Durable blob store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations on a
/// background thread. Clones share the same connection and the same closed
/// flag, so closing any clone closes them all.
#[derive(Clone, Debug)]
pub struct BlobStore {
    pub(crate) conn: Connection,
    closed: Arc<AtomicBool>,
}

impl BlobStore {
    /// Open a store at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas, and brings the
    /// schema up to date.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the file cannot be opened or
    /// initialized (permission denied, disk full, corruption).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("{}: {e}", path.display())))?;

        let store = Self::init(conn).await?;
        tracing::debug!(path = %path.display(), "opened blob store");
        Ok(store)
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        Self::init(conn).await
    }

    /// The process-wide store, opened on first use.
    ///
    /// Later calls return the same handle regardless of `path`. A failed
    /// open is not cached, so a later call may retry.
    pub async fn shared(path: impl AsRef<Path>) -> Result<Self, Error> {
        SHARED.get_or_try_init(|| Self::open(path)).await.cloned()
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(|e| Error::StorageUnavailable(format!("failed to configure store: {e}")))?;

        schema::apply(&conn).await.map_err(|e| match e {
            Error::StorageUnavailable(_) => e,
            other => Error::StorageUnavailable(other.to_string()),
        })?;

        Ok(Self { conn, closed: Arc::new(AtomicBool::new(false)) })
    }

    /// Whether [`BlobStore::close`] has been called on this store.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fails with `StoreClosed` once the store has been torn down.
    pub(crate) fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() { Err(Error::StoreClosed) } else { Ok(()) }
    }

    /// Release the underlying connection.
    ///
    /// Safe to call more than once; only the first call does any work.
    /// Every later operation on this store fails with `StoreClosed`.
    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.conn.clone().close().await {
            Ok(()) | Err(tokio_rusqlite::Error::ConnectionClosed) => {
                tracing::debug!("closed blob store");
                Ok(())
            }
            Err(e) => Err(Error::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = BlobStore::open_in_memory().await.unwrap();
        let version = db
            .conn
            .call(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
            .await
            .unwrap();
        assert!(!version.is_empty());
        assert!(!db.is_closed());
    }

    #[tokio::test]
    async fn test_open_unavailable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("cache.sqlite");

        let result = BlobStore::open(&path).await;
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_close_twice() {
        let db = BlobStore::open_in_memory().await.unwrap();
        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(db.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_shared_by_clones() {
        let db = BlobStore::open_in_memory().await.unwrap();
        let other = db.clone();
        db.close().await.unwrap();
        assert!(other.is_closed());
        assert!(matches!(other.ensure_open(), Err(Error::StoreClosed)));
    }

    #[tokio::test]
    async fn test_shared_returns_same_store() {
        let dir = tempfile::tempdir().unwrap();
        let first = BlobStore::shared(dir.path().join("shared.sqlite")).await.unwrap();
        let second = BlobStore::shared(dir.path().join("ignored.sqlite")).await.unwrap();

        assert!(Arc::ptr_eq(&first.closed, &second.closed));
        assert!(!dir.path().join("ignored.sqlite").exists());
    }
}
