//! Entry reads and writes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{params, rusqlite};

use super::connection::BlobStore;
use super::digest::payload_digest;
use crate::Error;

/// Listing metadata for one stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: String,
    pub size: u64,
    pub fetched_at: String,
}

impl BlobStore {
    /// Look up the payload stored under `key`.
    ///
    /// Returns None for unknown keys. A row whose digest no longer matches
    /// its payload is reported as absent so the caller refetches it.
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.ensure_open()?;

        let lookup = key.to_string();
        let row = self
            .conn
            .call(move |conn| -> Result<Option<(Vec<u8>, String)>, Error> {
                let result = conn.query_row(
                    "SELECT payload, digest FROM entries WHERE key = ?1",
                    params![lookup],
                    |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)),
                );

                match result {
                    Ok(found) => Ok(Some(found)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((payload, digest)) = row else {
            return Ok(None);
        };

        if payload_digest(&payload) != digest {
            tracing::warn!(url = key, "stored payload failed digest check; treating as absent");
            return Ok(None);
        }

        Ok(Some(Bytes::from(payload)))
    }

    /// Store the complete payload for `key`, replacing any previous entry.
    ///
    /// The upsert is a single statement, so concurrent readers see either
    /// the old payload or the new one.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageWrite` if the write fails, or
    /// `Error::StoreClosed` after teardown.
    pub async fn put(&self, key: &str, payload: &Bytes) -> Result<(), Error> {
        self.ensure_open()?;

        let key = key.to_string();
        let payload = payload.clone();
        let digest = payload_digest(&payload);
        let fetched_at = chrono::Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (key, payload, size, digest, fetched_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(key) DO UPDATE SET
                        payload = excluded.payload,
                        size = excluded.size,
                        digest = excluded.digest,
                        fetched_at = excluded.fetched_at",
                    params![key, &payload[..], payload.len() as i64, digest, fetched_at],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| match Error::from(e) {
                Error::StoreClosed => Error::StoreClosed,
                other => Error::StorageWrite(other.to_string()),
            })
    }

    /// Check whether an entry exists for `key`, without reading its payload.
    pub async fn contains(&self, key: &str) -> Result<bool, Error> {
        self.ensure_open()?;

        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM entries WHERE key = ?1)", params![key], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// List every stored entry, ordered by key.
    pub async fn entries(&self) -> Result<Vec<EntryInfo>, Error> {
        self.ensure_open()?;

        self.conn
            .call(|conn| -> Result<Vec<EntryInfo>, Error> {
                let mut stmt = conn.prepare("SELECT key, size, fetched_at FROM entries ORDER BY key")?;
                let rows = stmt.query_map([], |row| {
                    Ok(EntryInfo {
                        key: row.get(0)?,
                        size: row.get::<_, i64>(1)? as u64,
                        fetched_at: row.get(2)?,
                    })
                })?;

                let mut entries = Vec::new();
                for entry in rows {
                    entries.push(entry?);
                }
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let db = BlobStore::open_in_memory().await.unwrap();
        db.put("img/a.png", &Bytes::from_static(&[1, 2, 3])).await.unwrap();

        let payload = db.get("img/a.png").await.unwrap().unwrap();
        assert_eq!(payload.as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = BlobStore::open_in_memory().await.unwrap();
        assert!(db.get("nonexistent").await.unwrap().is_none());
        assert!(!db.contains("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_payload_is_an_entry() {
        let db = BlobStore::open_in_memory().await.unwrap();
        db.put("empty", &Bytes::new()).await.unwrap();

        let payload = db.get("empty").await.unwrap();
        assert_eq!(payload, Some(Bytes::new()));
        assert!(db.contains("empty").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = BlobStore::open_in_memory().await.unwrap();
        db.put("k", &Bytes::from_static(b"old")).await.unwrap();
        db.put("k", &Bytes::from_static(b"newer")).await.unwrap();

        assert_eq!(db.get("k").await.unwrap().unwrap().as_ref(), b"newer");
        let entries = db.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 5);
    }

    #[tokio::test]
    async fn test_entries_ordered_by_key() {
        let db = BlobStore::open_in_memory().await.unwrap();
        db.put("https://b.example/x", &Bytes::from_static(b"bb")).await.unwrap();
        db.put("https://a.example/y", &Bytes::from_static(b"a")).await.unwrap();

        let keys: Vec<String> = db.entries().await.unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["https://a.example/y", "https://b.example/x"]);
    }

    #[tokio::test]
    async fn test_corrupt_row_reads_as_absent() {
        let db = BlobStore::open_in_memory().await.unwrap();
        db.put("k", &Bytes::from_static(b"payload")).await.unwrap();

        db.conn
            .call(|conn| conn.execute("UPDATE entries SET payload = x'00' WHERE key = 'k'", []))
            .await
            .unwrap();

        assert!(db.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_operations_after_close() {
        let db = BlobStore::open_in_memory().await.unwrap();
        db.close().await.unwrap();

        assert!(matches!(db.get("k").await, Err(Error::StoreClosed)));
        assert!(matches!(db.put("k", &Bytes::new()).await, Err(Error::StoreClosed)));
        assert!(matches!(db.contains("k").await, Err(Error::StoreClosed)));
        assert!(matches!(db.entries().await, Err(Error::StoreClosed)));
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        let db = BlobStore::open(&path).await.unwrap();
        db.put("https://example.com/a.png", &Bytes::from_static(&[9, 8, 7])).await.unwrap();
        db.close().await.unwrap();

        let reopened = BlobStore::open(&path).await.unwrap();
        let payload = reopened.get("https://example.com/a.png").await.unwrap();
        assert_eq!(payload.as_deref(), Some(&[9u8, 8, 7][..]));
    }
}
