//! URL validation for fetchable keys.
//!
//! Keys are stored exactly as callers supply them; validation only decides
//! whether a key can be fetched over HTTP(S). Nothing here rewrites the key.

/// Error type for URL validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse `input` as an absolute `http`/`https` URL with a host.
///
/// Surrounding whitespace is ignored. Relative references and other schemes
/// are rejected.
pub fn validate_url(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_https() {
        let url = validate_url("https://example.com/img/a.png").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/img/a.png");
    }

    #[test]
    fn test_validate_keeps_query() {
        let url = validate_url("http://example.com/a.png?size=2x").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.query(), Some("size=2x"));
    }

    #[test]
    fn test_validate_trims_whitespace() {
        let url = validate_url("  https://example.com/a  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_validate_relative_rejected() {
        let result = validate_url("img/a.png");
        assert!(matches!(result, Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_validate_unsupported_scheme() {
        let result = validate_url("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(s)) if s == "file"));
    }

    #[test]
    fn test_validate_empty() {
        assert!(matches!(validate_url(""), Err(UrlError::Empty)));
        assert!(matches!(validate_url("   "), Err(UrlError::Empty)));
    }
}
