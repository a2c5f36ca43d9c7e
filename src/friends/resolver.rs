//! Feed URL discovery.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::Friend;
use crate::config::SpiderConfig;
use crate::feed::{FailureReason, FeedFetcher, FetchError, FetchedFeed};

/// Discovers a friend's feed by probing conventional paths under the homepage.
#[derive(Debug, Clone)]
pub struct FriendResolver {
    fetcher: FeedFetcher,
    feed_paths: Vec<String>,
    probe_timeout: Duration,
}

impl FriendResolver {
    /// Create a resolver sharing the given fetcher.
    pub fn new(fetcher: FeedFetcher, config: &SpiderConfig) -> Self {
        Self {
            fetcher,
            feed_paths: config.feed_paths.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
        }
    }

    /// Candidate feed URLs for a homepage, in probe order.
    pub fn candidates(&self, homepage: &str) -> Vec<String> {
        let base = homepage.trim().trim_end_matches('/');
        self.feed_paths
            .iter()
            .map(|path| {
                if path.starts_with('/') {
                    format!("{base}{path}")
                } else {
                    format!("{base}/{path}")
                }
            })
            .collect()
    }

    /// Probe candidates in order and return the first that parses as a feed.
    ///
    /// When nothing parses, the failure is `unreachable` (or `timeout`) if no
    /// probe got any answer from the host, and `no-feed-found` otherwise.
    pub async fn discover(
        &self,
        friend: &Friend,
        max_articles: usize,
        now: DateTime<Utc>,
    ) -> Result<(String, FetchedFeed), FetchError> {
        let mut got_response = false;
        let mut all_timeouts = true;

        for candidate in self.candidates(&friend.link) {
            match self
                .fetcher
                .probe(&candidate, max_articles, self.probe_timeout, now)
                .await
            {
                Ok(feed) => {
                    debug!(friend = %friend.name, url = %candidate, format = feed.format, "Discovered feed");
                    return Ok((candidate, feed));
                }
                Err(e) => {
                    debug!(friend = %friend.name, url = %candidate, error = %e, "Probe failed");
                    got_response |= e.got_response();
                    all_timeouts &= e.reason == FailureReason::Timeout;
                }
            }
        }

        let message = format!("{}: no feed at any conventional path", friend.link);
        Err(if got_response {
            FetchError::no_feed_found(message)
        } else if all_timeouts && !self.feed_paths.is_empty() {
            FetchError::timeout(message)
        } else {
            FetchError::unreachable(message)
        })
    }
}
