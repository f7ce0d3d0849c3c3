//! Network retrieval seam.
//!
//! The resolver only knows this trait; the HTTP implementation lives in the
//! client crate and tests plug in scripted fetchers.

use bytes::Bytes;

use crate::FetchError;

/// Progress callback: `(received_bytes, total_bytes_if_known)`.
pub type ProgressFn<'a> = dyn Fn(u64, Option<u64>) + Send + Sync + 'a;

/// Retrieves the full payload behind a URL in a single attempt.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, reporting progress as data arrives.
    ///
    /// `progress` is called zero or more times before this returns, with
    /// non-decreasing `received_bytes`. Success means a 2xx status and the
    /// complete body.
    async fn fetch(&self, url: &str, progress: &ProgressFn<'_>) -> Result<Bytes, FetchError>;
}
