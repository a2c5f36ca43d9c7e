//! Aggregation of all friends' feeds into one article collection.
//!
//! # Output documents
//!
//! - [`AggregateResult`] is written as `all.json`
//! - the list of [`LostFriend`] records is written as `errors.json`
//!
//! Both are also the interchange format read back from peer deployments.

mod engine;

pub use engine::{AggregateSettings, Aggregation, Aggregator};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::{Article, FailureReason};

/// The aggregate document (`all.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Articles, newest first.
    pub article_data: Vec<Article>,
    /// Number of distinct friends represented in `article_data`.
    pub friend_count: usize,
    /// Length of `article_data`.
    pub article_count: usize,
    /// When the document was produced.
    pub last_updated: DateTime<Utc>,
}

impl AggregateResult {
    /// Build a result from an unordered article collection.
    ///
    /// Earlier duplicates win, so callers put preferred sources first.
    pub fn from_articles(articles: Vec<Article>, cap: usize, last_updated: DateTime<Utc>) -> Self {
        let mut result = Self {
            article_data: dedupe_sort_cap(articles, cap),
            friend_count: 0,
            article_count: 0,
            last_updated,
        };
        result.recount();
        result
    }

    /// Recompute `friend_count` and `article_count` from `article_data`.
    pub fn recount(&mut self) {
        self.article_count = self.article_data.len();
        self.friend_count = self
            .article_data
            .iter()
            .map(|a| a.source.as_str())
            .collect::<HashSet<_>>()
            .len();
    }
}

/// A friend whose feed could not be fetched this run (`errors.json` entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LostFriend {
    pub name: String,
    pub link: String,
    #[serde(default)]
    pub avatar: String,
    pub reason: FailureReason,
    /// Whether cached articles stood in for the failed fetch.
    #[serde(default)]
    pub backfilled: bool,
}

/// De-duplicate by identity (first occurrence wins), sort newest first and cap.
///
/// Ties on the timestamp are ordered by identity so the output is stable.
pub fn dedupe_sort_cap(articles: Vec<Article>, cap: usize) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut keyed: Vec<(String, Article)> = articles
        .into_iter()
        .filter_map(|a| {
            let id = a.identity();
            seen.insert(id.clone()).then_some((id, a))
        })
        .collect();

    keyed.sort_by(|(id_a, a), (id_b, b)| b.published.cmp(&a.published).then_with(|| id_a.cmp(id_b)));
    keyed.truncate(cap);
    keyed.into_iter().map(|(_, a)| a).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(link: &str, source: &str, hour: u32) -> Article {
        Article {
            title: format!("Post {link}"),
            link: link.to_string(),
            published: Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap(),
            summary: String::new(),
            author: String::new(),
            source: source.to_string(),
            avatar: String::new(),
        }
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let mut local = article("https://a.example/1", "Alice", 1);
        local.summary = "local".to_string();
        let mut remote = article("http://A.example/1/", "Alice", 1);
        remote.summary = "remote".to_string();

        let out = dedupe_sort_cap(vec![local, remote], 10);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].summary, "local");
    }

    #[test]
    fn test_sort_descending_with_stable_ties() {
        let out = dedupe_sort_cap(
            vec![
                article("https://a.example/b", "A", 5),
                article("https://a.example/old", "A", 1),
                article("https://a.example/a", "A", 5),
                article("https://a.example/new", "A", 9),
            ],
            10,
        );

        let links: Vec<&str> = out.iter().map(|a| a.link.as_str()).collect();
        assert_eq!(
            links,
            vec![
                "https://a.example/new",
                "https://a.example/a",
                "https://a.example/b",
                "https://a.example/old",
            ]
        );
    }

    #[test]
    fn test_cap_drops_oldest() {
        let articles = (0..10)
            .map(|h| article(&format!("https://a.example/{h}"), "A", h))
            .collect();
        let out = dedupe_sort_cap(articles, 3);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].link, "https://a.example/9");
        assert_eq!(out[2].link, "https://a.example/7");
    }

    #[test]
    fn test_from_articles_counts() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let result = AggregateResult::from_articles(
            vec![
                article("https://a.example/1", "Alice", 1),
                article("https://a.example/2", "Alice", 2),
                article("https://b.example/1", "Bob", 3),
            ],
            100,
            now,
        );

        assert_eq!(result.article_count, 3);
        assert_eq!(result.friend_count, 2);
        assert_eq!(result.last_updated, now);
    }

    #[test]
    fn test_lost_friend_wire_format() {
        let lost = LostFriend {
            name: "Alice".to_string(),
            link: "https://alice.example.com".to_string(),
            avatar: String::new(),
            reason: FailureReason::NoFeedFound,
            backfilled: true,
        };

        let json = serde_json::to_value(&lost).unwrap();
        assert_eq!(json["reason"], "no-feed-found");
        assert_eq!(json["backfilled"], true);
    }
}
