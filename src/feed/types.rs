//! Feed types for friend-circle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum summary length kept by the fetcher, in characters.
pub const MAX_SUMMARY_CHARS: usize = 1000;

/// Title used for entries that have a link but no title.
pub const UNTITLED: &str = "Untitled";

/// Separator between title and source in link-less article identities.
const IDENTITY_SEPARATOR: char = '\u{1f}';

/// Why a friend's feed could not be fetched this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Connection failure, refused URL or non-2xx status.
    Unreachable,
    /// Request or per-friend deadline exceeded.
    Timeout,
    /// Body is not a recognisable feed.
    ParseError,
    /// Every conventional feed path was tried without success.
    NoFeedFound,
}

impl FailureReason {
    /// The wire name of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Unreachable => "unreachable",
            FailureReason::Timeout => "timeout",
            FailureReason::ParseError => "parse-error",
            FailureReason::NoFeedFound => "no-feed-found",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified per-friend failure. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct FetchError {
    /// Failure class.
    pub reason: FailureReason,
    /// Human readable detail for logs.
    pub message: String,
    /// HTTP status when the server answered with a non-success code.
    pub status: Option<u16>,
}

impl FetchError {
    /// Create a new error.
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            status: None,
        }
    }

    /// A non-success HTTP response.
    pub fn http_status(url: &str, status: reqwest::StatusCode) -> Self {
        Self {
            status: Some(status.as_u16()),
            ..Self::unreachable(format!("{url}: HTTP {status}"))
        }
    }

    /// Whether the remote host answered at all.
    pub fn got_response(&self) -> bool {
        self.status.is_some() || self.reason == FailureReason::ParseError
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Unreachable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureReason::Timeout, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(FailureReason::ParseError, message)
    }

    pub fn no_feed_found(message: impl Into<String>) -> Self {
        Self::new(FailureReason::NoFeedFound, message)
    }

    /// Classify a transport error.
    pub fn from_transport(url: &str, e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("{url}: {e}"))
        } else {
            Self::unreachable(format!("{url}: {e}"))
        }
    }
}

/// One normalised feed entry, not yet attributed to a friend.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    /// Entry title ("Untitled" when missing).
    pub title: String,
    /// Absolute link, empty when the entry has none.
    pub link: String,
    /// Publication time.
    pub published: DateTime<Utc>,
    /// Plain-text summary.
    pub summary: String,
    /// Entry author, empty when unknown.
    pub author: String,
}

impl FeedEntry {
    /// Attribute the entry to a friend.
    pub fn into_article(self, source: &str, avatar: &str) -> Article {
        Article {
            title: self.title,
            link: self.link,
            published: self.published,
            summary: self.summary,
            author: self.author,
            source: source.to_string(),
            avatar: avatar.to_string(),
        }
    }
}

/// A parsed feed document.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    /// Feed title.
    pub title: String,
    /// Name of the extraction strategy that handled the document.
    pub format: &'static str,
    /// Entries in document order, capped by the caller's limit.
    pub entries: Vec<FeedEntry>,
}

/// An article in the aggregate output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub author: String,
    /// Name of the friend the article came from.
    pub source: String,
    /// Avatar of the friend the article came from.
    #[serde(default)]
    pub avatar: String,
}

impl Article {
    /// Identity key used for de-duplication and snapshot diffs.
    pub fn identity(&self) -> String {
        if self.link.trim().is_empty() {
            format!("{}{IDENTITY_SEPARATOR}{}", self.title, self.source)
        } else {
            identity_key(&self.link)
        }
    }
}

/// Normalise a URL into an identity key.
///
/// Lower-cases, drops the http(s) scheme and trailing slashes, so that
/// `https://Blog.example.com/` and `http://blog.example.com` compare equal.
pub fn identity_key(url: &str) -> String {
    let lowered = url.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    without_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(title: &str, link: &str, source: &str) -> Article {
        Article {
            title: title.to_string(),
            link: link.to_string(),
            published: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            summary: String::new(),
            author: String::new(),
            source: source.to_string(),
            avatar: String::new(),
        }
    }

    #[test]
    fn test_failure_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&FailureReason::ParseError).unwrap(),
            "\"parse-error\""
        );
        assert_eq!(
            serde_json::from_str::<FailureReason>("\"no-feed-found\"").unwrap(),
            FailureReason::NoFeedFound
        );
        assert_eq!(FailureReason::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::unreachable("https://a.example/feed: HTTP 404");
        assert_eq!(err.to_string(), "unreachable: https://a.example/feed: HTTP 404");
    }

    #[test]
    fn test_fetch_error_got_response() {
        assert!(!FetchError::unreachable("connection refused").got_response());
        assert!(!FetchError::timeout("deadline").got_response());
        assert!(FetchError::parse_error("not a feed").got_response());

        let err = FetchError::http_status("https://a.example/feed", reqwest::StatusCode::NOT_FOUND);
        assert_eq!(err.reason, FailureReason::Unreachable);
        assert_eq!(err.status, Some(404));
        assert!(err.got_response());
    }

    #[test]
    fn test_identity_key_normalisation() {
        assert_eq!(identity_key("https://Blog.Example.com/"), "blog.example.com");
        assert_eq!(identity_key("http://blog.example.com"), "blog.example.com");
        assert_eq!(identity_key("  https://a.example/posts//  "), "a.example/posts");
        assert_eq!(identity_key(""), "");
    }

    #[test]
    fn test_article_identity_by_link() {
        let a = article("One", "https://A.example/1/", "Alice");
        let b = article("Renamed", "http://a.example/1", "Someone else");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_article_identity_without_link() {
        let a = article("Hello", "", "Alice");
        let b = article("Hello", "", "Bob");
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), "Hello\u{1f}Alice");
    }

    #[test]
    fn test_article_deserialize_defaults() {
        let json = r#"{"title":"T","link":"https://a.example/t","published":"2024-01-01T00:00:00Z","source":"A"}"#;
        let parsed: Article = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.summary, "");
        assert_eq!(parsed.avatar, "");
    }
}
