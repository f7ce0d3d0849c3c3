//! Terminal rendering of resolves.

use bytes::Bytes;

use fetchonce_core::{Error, ProgressState, RenderStrategy};

/// One line of terminal output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Goes to stderr while a fetch runs.
    Progress(String),
    /// Final line for a URL, on stdout.
    Summary(String),
}

impl Line {
    pub fn print(&self) {
        match self {
            Line::Progress(text) => eprintln!("{text}"),
            Line::Summary(text) => println!("{text}"),
        }
    }
}

/// Renders the resolve of one URL as text lines prefixed with the URL.
pub struct TextRender<'a> {
    url: &'a str,
}

impl<'a> TextRender<'a> {
    pub fn new(url: &'a str) -> Self {
        Self { url }
    }
}

impl RenderStrategy for TextRender<'_> {
    type Node = Line;

    fn render_success(&self, bytes: &Bytes) -> Line {
        Line::Summary(format!("{}\tok\t{} bytes", self.url, bytes.len()))
    }

    fn render_error(&self, error: &Error) -> Line {
        Line::Summary(format!("{}\tfailed\t{error}", self.url))
    }

    fn render_progress(&self, progress: &ProgressState) -> Line {
        let text = match (progress.ratio(), progress.total_bytes) {
            (Some(ratio), Some(total)) => {
                format!("{}\t{:.0}%\t{}/{total} bytes", self.url, ratio * 100.0, progress.downloaded_bytes)
            }
            _ => format!("{}\t{} bytes", self.url, progress.downloaded_bytes),
        };
        Line::Progress(text)
    }
}

/// File name for the payload of `key` inside an output directory.
///
/// Uses the last non-empty path segment, then the host, then "index".
/// Characters that are unsafe in file names are replaced with `_`.
pub fn file_name_for(key: &str) -> String {
    let candidate = match url::Url::parse(key) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
            .or_else(|| url.host_str().map(str::to_string)),
        Err(_) => key.rsplit('/').find(|s| !s.is_empty()).map(str::to_string),
    };

    let name: String = candidate
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') { "index".to_string() } else { name }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchonce_core::{FetchError, Phase};

    #[test]
    fn test_file_name_from_last_segment() {
        assert_eq!(file_name_for("https://cdn.test/img/a.png"), "a.png");
        assert_eq!(file_name_for("https://cdn.test/img/dir/"), "dir");
        assert_eq!(file_name_for("https://cdn.test/a%20b.png?x=1"), "a_20b.png");
    }

    #[test]
    fn test_file_name_falls_back_to_host() {
        assert_eq!(file_name_for("https://cdn.test/"), "cdn.test");
    }

    #[test]
    fn test_file_name_for_plain_key() {
        assert_eq!(file_name_for("img/a.png"), "a.png");
        assert_eq!(file_name_for("/"), "index");
        assert_eq!(file_name_for(".."), "index");
    }

    #[test]
    fn test_render_lines() {
        let render = TextRender::new("img/a.png");

        let known = ProgressState { downloaded_bytes: 50, total_bytes: Some(200), phase: Phase::Downloading };
        assert_eq!(render.render_progress(&known), Line::Progress("img/a.png\t25%\t50/200 bytes".into()));

        let unknown = ProgressState { downloaded_bytes: 7, total_bytes: None, phase: Phase::Downloading };
        assert_eq!(render.render_progress(&unknown), Line::Progress("img/a.png\t7 bytes".into()));

        assert_eq!(
            render.render_success(&Bytes::from_static(b"abc")),
            Line::Summary("img/a.png\tok\t3 bytes".into())
        );

        let failed = render.render_error(&Error::Fetch(FetchError::status(404)));
        assert!(matches!(failed, Line::Summary(text) if text.starts_with("img/a.png\tfailed\tFETCH_FAILED")));
    }
}
