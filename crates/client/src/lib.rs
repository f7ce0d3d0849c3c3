//! Network side of fetchonce.
//!
//! This crate provides the HTTP(S) implementation of the core `Fetcher`
//! trait: a streamed GET with byte-level progress and URL validation.

pub mod fetch;

pub use fetch::{FetchConfig, HttpFetcher, UrlError, validate_url};
