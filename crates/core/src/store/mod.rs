//! SQLite-backed durable store for fetched payloads.
//!
//! Maps a URL key to the complete bytes of a successful download. Access is
//! async via tokio-rusqlite, which runs every statement on a dedicated
//! background thread. It supports:
//!
//! - Single-statement upserts, so readers never observe a partial payload
//! - SHA-256 payload digests checked on every read
//! - Versioned schema setup applied at open
//! - WAL mode for concurrent access

pub mod connection;
pub mod digest;
pub mod entries;
pub mod schema;

pub use connection::BlobStore;
pub use entries::EntryInfo;
