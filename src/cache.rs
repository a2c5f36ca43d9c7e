//! On-disk per-friend cache.
//!
//! Keyed by friend identity; each entry holds the last successful fetch of
//! that friend and the feed URL that worked. Used to backfill friends whose
//! fetch fails and to skip feed discovery on later runs.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::feed::Article;
use crate::output::write_json;
use crate::Result;

/// The last successful fetch of one friend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Friend name at the time of the fetch.
    pub name: String,
    /// Feed URL that produced the articles.
    #[serde(default)]
    pub feed_url: Option<String>,
    /// Articles as published to the aggregate.
    pub articles: Vec<Article>,
    /// When the fetch happened.
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) <= max_age
    }
}

/// Per-friend cache, serialised as a JSON object keyed by friend identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl FeedCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache file.
    ///
    /// A missing file is an empty cache; an unreadable or corrupt one is
    /// logged and treated as empty so a bad cache never blocks a run.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No cache file, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache, starting empty");
                return Self::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache, starting empty");
                Self::new()
            }
        }
    }

    /// Write the cache atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path, self)
    }

    /// Look up an entry regardless of age.
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Look up an entry no older than `max_age`.
    pub fn fresh_entry(&self, key: &str, now: DateTime<Utc>, max_age: Duration) -> Option<&CacheEntry> {
        self.entries.get(key).filter(|e| e.is_fresh(now, max_age))
    }

    /// The feed URL that last worked for a friend.
    pub fn feed_url_hint(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.feed_url.as_deref())
    }

    /// Overwrite a friend's entry with a successful fetch.
    pub fn record_success(
        &mut self,
        key: impl Into<String>,
        name: impl Into<String>,
        feed_url: Option<String>,
        articles: Vec<Article>,
        fetched_at: DateTime<Utc>,
    ) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                name: name.into(),
                feed_url,
                articles,
                fetched_at,
            },
        );
    }

    /// Drop entries older than `max_age`. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now, max_age));
        before - self.entries.len()
    }

    /// Number of cached friends.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no friends.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
