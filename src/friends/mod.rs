//! Friend manifest and feed resolution.
//!
//! The manifest is fetched once per run; a fetch or parse failure is fatal
//! because there is nothing to aggregate without it.

mod resolver;

pub use resolver::FriendResolver;

use std::collections::HashSet;

use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::StaticFeedConfig;
use crate::feed::{identity_key, FeedFetcher};
use crate::{FriendCircleError, Result};

/// A blog whose feed is aggregated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Friend {
    /// Display name.
    pub name: String,
    /// Homepage URL.
    pub link: String,
    /// Feed URL when known up front.
    pub feed_url: Option<String>,
    /// Avatar URL.
    pub avatar: String,
}

impl Friend {
    /// Identity key (normalised homepage URL).
    pub fn key(&self) -> String {
        identity_key(&self.link)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Manifest {
    // Bare first: a struct variant would also accept a JSON array
    Bare(Vec<ManifestEntry>),
    Wrapped { friends: Vec<ManifestEntry> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestEntry {
    Object(ManifestFriend),
    Tuple(Vec<serde_json::Value>),
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct ManifestFriend {
    name: String,
    link: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default, alias = "rss", alias = "feed_url")]
    feed: Option<String>,
}

impl ManifestEntry {
    fn into_friend(self) -> Option<Friend> {
        match self {
            ManifestEntry::Object(f) => Some(Friend {
                name: f.name.trim().to_string(),
                link: f.link.trim().to_string(),
                feed_url: f.feed.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
                avatar: f.avatar.unwrap_or_default(),
            }),
            ManifestEntry::Tuple(fields) => {
                let text = |i: usize| {
                    fields
                        .get(i)
                        .and_then(|v| v.as_str())
                        .map(|s| s.trim().to_string())
                        .unwrap_or_default()
                };
                Some(Friend {
                    name: text(0),
                    link: text(1),
                    feed_url: None,
                    avatar: text(2),
                })
            }
            ManifestEntry::Other(_) => None,
        }
    }
}

/// Parse a manifest document.
///
/// Accepts `{"friends": [[name, link, avatar], ...]}`, `{"friends": [{...}]}`
/// or a bare list of either. Unusable entries are skipped with a warning and
/// repeated homepages keep their first occurrence.
pub fn parse_manifest(bytes: &[u8]) -> Result<Vec<Friend>> {
    let manifest: Manifest = serde_json::from_slice(bytes)
        .map_err(|e| FriendCircleError::Manifest(format!("invalid manifest: {e}")))?;

    let entries = match manifest {
        Manifest::Bare(friends) => friends,
        Manifest::Wrapped { friends } => friends,
    };

    let mut seen = HashSet::new();
    let mut friends = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let Some(friend) = entry.into_friend().filter(|f| !f.name.is_empty() && !f.link.is_empty())
        else {
            warn!(index, "Skipping manifest entry without name and link");
            continue;
        };
        if !seen.insert(friend.key()) {
            debug!(name = %friend.name, link = %friend.link, "Skipping duplicate manifest entry");
            continue;
        }
        friends.push(friend);
    }

    Ok(friends)
}

/// Fetch and parse the manifest.
pub async fn fetch_manifest(fetcher: &FeedFetcher, url: &str) -> Result<Vec<Friend>> {
    let bytes = fetcher
        .fetch_document(url)
        .await
        .map_err(|e| FriendCircleError::Manifest(e.to_string()))?;
    let friends = parse_manifest(&bytes)?;
    info!(url = %url, friends = friends.len(), "Fetched friend manifest");
    Ok(friends)
}

/// Merge configured static feeds into the manifest friends.
///
/// A static feed matching a friend by name (case-insensitive) or homepage
/// supplies that friend's feed URL when the manifest gave none. Unmatched
/// static feeds are appended as new friends.
pub fn merge_static_feeds(mut friends: Vec<Friend>, statics: &[StaticFeedConfig]) -> Vec<Friend> {
    for feed in statics {
        let link = feed
            .link
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| origin_of(&feed.url));
        let key = identity_key(&link);

        let matched = friends
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(feed.name.trim()) || f.key() == key);

        match matched {
            Some(friend) => {
                if friend.feed_url.is_none() {
                    friend.feed_url = Some(feed.url.clone());
                }
                if friend.avatar.is_empty() {
                    friend.avatar = feed.avatar.clone().unwrap_or_default();
                }
            }
            None => friends.push(Friend {
                name: feed.name.trim().to_string(),
                link,
                feed_url: Some(feed.url.clone()),
                avatar: feed.avatar.clone().unwrap_or_default(),
            }),
        }
    }

    friends
}

/// `scheme://host[:port]` of a URL, or the URL itself when it does not parse.
fn origin_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_feed(name: &str, url: &str) -> StaticFeedConfig {
        StaticFeedConfig {
            name: name.to_string(),
            url: url.to_string(),
            link: None,
            avatar: None,
        }
    }

    #[test]
    fn test_parse_manifest_tuple_form() {
        let json = r#"{"friends": [
            ["Alice", "https://alice.example.com/", "https://alice.example.com/a.png"],
            ["Bob", "https://bob.example.com"],
            ["Broken"]
        ]}"#;

        let friends = parse_manifest(json.as_bytes()).unwrap();
        assert_eq!(friends.len(), 2);
        assert_eq!(friends[0].name, "Alice");
        assert_eq!(friends[0].avatar, "https://alice.example.com/a.png");
        assert_eq!(friends[0].key(), "alice.example.com");
        assert_eq!(friends[1].avatar, "");
        assert!(friends[1].feed_url.is_none());
    }

    #[test]
    fn test_parse_manifest_object_form() {
        let json = r#"[
            {"name": "Alice", "link": "https://alice.example.com", "avatar": "a.png"},
            {"name": "Carol", "link": "https://carol.example.com", "rss": "https://carol.example.com/feed.xml"},
            {"unexpected": true}
        ]"#;

        let friends = parse_manifest(json.as_bytes()).unwrap();
        assert_eq!(friends.len(), 2);
        assert_eq!(
            friends[1].feed_url.as_deref(),
            Some("https://carol.example.com/feed.xml")
        );
    }

    #[test]
    fn test_parse_manifest_skips_unrecognised_entries() {
        let json = r#"{"friends": [
            42,
            null,
            "https://loose.example.com",
            {"name": "Dana", "link": "https://dana.example.com"},
            {"nested": {"deep": [1, 2, 3]}}
        ]}"#;

        let friends = parse_manifest(json.as_bytes()).unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].name, "Dana");
    }

    #[test]
    fn test_parse_manifest_duplicates_keep_first() {
        let json = r#"{"friends": [
            ["Alice", "https://alice.example.com/", ""],
            ["Alice again", "http://ALICE.example.com", ""]
        ]}"#;

        let friends = parse_manifest(json.as_bytes()).unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].name, "Alice");
    }

    #[test]
    fn test_parse_manifest_invalid() {
        let result = parse_manifest(b"<html>not json</html>");
        assert!(matches!(result, Err(FriendCircleError::Manifest(_))));

        let result = parse_manifest(br#"{"friends": 3}"#);
        assert!(matches!(result, Err(FriendCircleError::Manifest(_))));
    }

    #[test]
    fn test_merge_static_feeds_fills_missing_feed_url() {
        let friends = vec![Friend {
            name: "Alice".to_string(),
            link: "https://alice.example.com".to_string(),
            feed_url: None,
            avatar: "a.png".to_string(),
        }];

        let merged = merge_static_feeds(
            friends,
            &[static_feed("alice", "https://alice.example.com/custom.xml")],
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].feed_url.as_deref(),
            Some("https://alice.example.com/custom.xml")
        );
        assert_eq!(merged[0].avatar, "a.png");
    }

    #[test]
    fn test_merge_static_feeds_manifest_feed_wins() {
        let friends = vec![Friend {
            name: "Carol".to_string(),
            link: "https://carol.example.com".to_string(),
            feed_url: Some("https://carol.example.com/atom.xml".to_string()),
            avatar: String::new(),
        }];

        let merged = merge_static_feeds(
            friends,
            &[static_feed("Someone", "https://carol.example.com/rss.xml")],
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].feed_url.as_deref(),
            Some("https://carol.example.com/atom.xml")
        );
    }

    #[test]
    fn test_merge_static_feeds_appends_unmatched() {
        let merged = merge_static_feeds(
            Vec::new(),
            &[static_feed("Dave", "https://dave.example.com:8443/blog/feed.xml")],
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].link, "https://dave.example.com:8443");
        assert_eq!(
            merged[0].feed_url.as_deref(),
            Some("https://dave.example.com:8443/blog/feed.xml")
        );
    }
}
