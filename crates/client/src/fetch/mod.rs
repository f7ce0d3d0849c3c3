//! HTTP fetcher with streamed bodies and progress reporting.
//!
//! ### Request
//! - Single GET per call; no retries (the caller decides whether to retry).
//! - Max redirects: 5 (configurable)
//! - Max body bytes: 50MB (configurable), checked against Content-Length and
//!   again while streaming.
//!
//! ### Progress
//! - The body is read chunk by chunk; after each chunk the running byte
//!   count and the announced Content-Length (if any) are reported.
//!
//! ### Status
//! - 2xx is success, including empty bodies. Anything else fails with the
//!   status attached.

pub mod url;

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Client;

use fetchonce_core::{AppConfig, FetchError, Fetcher, ProgressFn};

pub use self::url::{UrlError, validate_url};

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "fetchonce/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 50MB)
    pub max_bytes: usize,

    /// Request timeout (default: 30s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "fetchonce/0.1".to_string(),
            max_bytes: 50 * 1024 * 1024,
            timeout: Duration::from_millis(30_000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// [`Fetcher`] over HTTP(S) using reqwest.
pub struct HttpFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| FetchError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(http, config))
    }

    /// Wrap an already configured client. Only `max_bytes` of `config` is
    /// applied by the fetcher itself; the rest is the client's business.
    pub fn with_client(http: Client, config: FetchConfig) -> Self {
        Self { http, config }
    }

    fn too_large(&self, size: u64, status: u16) -> FetchError {
        FetchError { cause: format!("{size} bytes exceeds limit of {}", self.config.max_bytes), status: Some(status) }
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("network error: {err}")
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url_str: &str, progress: &ProgressFn<'_>) -> Result<Bytes, FetchError> {
        let start = Instant::now();
        let url = validate_url(url_str).map_err(|e| FetchError::transport(format!("invalid URL: {e}")))?;

        let response = self
            .http
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FetchError::transport(describe(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(status.as_u16()));
        }
        let code = status.as_u16();
        let max_bytes = self.config.max_bytes as u64;

        let total = response.content_length();
        if let Some(len) = total
            && len > max_bytes
        {
            return Err(self.too_large(len, code));
        }

        let mut body = BytesMut::with_capacity(total.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError {
                cause: format!("failed to read response: {}", describe(&e)),
                status: Some(code),
            })?;

            let received = (body.len() + chunk.len()) as u64;
            if received > max_bytes {
                return Err(self.too_large(received, code));
            }

            body.extend_from_slice(&chunk);
            progress(received, total);
        }

        tracing::debug!(
            url = %url,
            status = code,
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(body.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port; returns a URL for it.
    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            socket.write_all(response).await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/img/a.png")
    }

    fn fetcher(config: FetchConfig) -> HttpFetcher {
        let http = Client::builder().no_proxy().timeout(config.timeout).build().unwrap();
        HttpFetcher::with_client(http, config)
    }

    async fn fetch_recording(
        fetcher: &HttpFetcher, url: &str,
    ) -> (Result<Bytes, FetchError>, Vec<(u64, Option<u64>)>) {
        let events = Mutex::new(Vec::new());
        let result = fetcher
            .fetch(url, &|received, total| events.lock().unwrap().push((received, total)))
            .await;
        (result, events.into_inner().unwrap())
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "fetchonce/0.1");
        assert_eq!(config.max_bytes, 50 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(30_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "custom/1".into(), max_bytes: 10, timeout_ms: 500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "custom/1");
        assert_eq!(config.max_bytes, 10);
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_http_fetcher_new() {
        assert!(HttpFetcher::new(FetchConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_success_reports_progress() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\n\x01\x02\x03").await;
        let (result, events) = fetch_recording(&fetcher(FetchConfig::default()), &url).await;

        assert_eq!(result.unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(events.last(), Some(&(3, Some(3))));
        assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test]
    async fn test_fetch_chunked_has_unknown_total() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n",
        )
        .await;
        let (result, events) = fetch_recording(&fetcher(FetchConfig::default()), &url).await;

        assert_eq!(result.unwrap().as_ref(), b"abcde");
        assert!(events.iter().all(|(_, total)| total.is_none()));
        assert_eq!(events.last().map(|e| e.0), Some(5));
    }

    #[tokio::test]
    async fn test_fetch_not_found() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let (result, events) = fetch_recording(&fetcher(FetchConfig::default()), &url).await;

        let err = result.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_success() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let (result, _) = fetch_recording(&fetcher(FetchConfig::default()), &url).await;

        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_announced_body_too_large() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n0123456789").await;
        let config = FetchConfig { max_bytes: 4, ..Default::default() };
        let (result, _) = fetch_recording(&fetcher(config), &url).await;

        let err = result.unwrap_err();
        assert_eq!(err.status, Some(200));
        assert!(err.cause.contains("exceeds"));
    }

    #[tokio::test]
    async fn test_fetch_streamed_body_too_large() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nabcde\r\n0\r\n\r\n",
        )
        .await;
        let config = FetchConfig { max_bytes: 4, ..Default::default() };
        let (result, _) = fetch_recording(&fetcher(config), &url).await;

        assert!(result.unwrap_err().cause.contains("exceeds"));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let (result, _) = fetch_recording(&fetcher(FetchConfig::default()), "img/a.png").await;

        let err = result.unwrap_err();
        assert_eq!(err.status, None);
        assert!(err.cause.contains("invalid URL"));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (result, _) = fetch_recording(&fetcher(FetchConfig::default()), &format!("http://{addr}/x")).await;
        assert_eq!(result.unwrap_err().status, None);
    }
}
