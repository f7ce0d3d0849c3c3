//! Core types and shared functionality for fetchonce.
//!
//! This crate provides:
//! - Durable blob store with SQLite backend
//! - Fetch-once resolver that deduplicates concurrent downloads
//! - Download progress channel
//! - Pluggable presentation strategies
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod fetcher;
pub mod progress;
pub mod render;
pub mod resolver;
pub mod store;

pub use config::AppConfig;
pub use error::{Error, FetchError};
pub use fetcher::{Fetcher, ProgressFn};
pub use progress::{Phase, ProgressChannel, ProgressState, ProgressSubscription};
pub use render::{RenderFns, RenderStrategy, present, present_refresh};
pub use resolver::{Resolver, ResolverOptions, ResolverStats};
pub use store::{BlobStore, EntryInfo};
