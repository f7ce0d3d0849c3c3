//! Versioned schema setup.
//!
//! The applied version lives in SQLite's `user_version` pragma. Pending steps
//! run in order inside one transaction, so a half-applied schema is never
//! left behind.

use crate::Error;
use tokio_rusqlite::Connection;

/// Schema steps, applied in order. Step `n` brings the schema to version `n + 1`.
const STEPS: &[&str] = &[
    include_str!("../../migrations/001_entries.sql"),
    include_str!("../../migrations/002_entries_fetched_at.sql"),
];

/// Latest schema version known to this build.
pub const SCHEMA_VERSION: i64 = STEPS.len() as i64;

/// Bring the database schema up to [`SCHEMA_VERSION`].
///
/// # Errors
///
/// Returns `Error::SchemaFailed` if a step fails, or if the file was written
/// by a newer build.
pub async fn apply(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let tx = conn.transaction()?;
        let current: i64 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if current > SCHEMA_VERSION {
            return Err(Error::SchemaFailed(format!(
                "database schema version {current} is newer than supported version {SCHEMA_VERSION}"
            )));
        }

        for (idx, sql) in STEPS.iter().enumerate() {
            let version = idx as i64 + 1;
            if version > current {
                tx.execute_batch(sql)
                    .map_err(|e| Error::SchemaFailed(format!("step {version}: {e}")))?;
            }
        }

        tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
        tx.commit()?;
        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Current schema version of an open database.
pub async fn version(conn: &Connection) -> Result<i64, Error> {
    conn.call(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0)))
        .await
        .map_err(Error::from)
}
