//! Merging a peer deployment's published results into the local ones.
//!
//! The peer publishes the same `all.json` / `errors.json` documents this
//! crate writes. Older peers use `created` instead of `published`, naive
//! timestamps, and `[name, link, avatar]` tuples in `errors.json`; all of
//! these are accepted. Any failure to fetch or read the peer documents
//! leaves the local data unchanged.

use std::collections::HashSet;

use chrono_tz::Tz;
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::{info, warn};

use crate::aggregate::{AggregateResult, LostFriend};
use crate::config::Config;
use crate::datetime::{parse_timestamp, parse_timezone};
use crate::feed::{identity_key, Article, FailureReason, FeedFetcher, UNTITLED};

#[derive(Debug, Deserialize)]
struct RemoteResult {
    #[serde(default)]
    article_data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RemoteArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default, alias = "created")]
    published: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteLostFriend {
    Record {
        name: String,
        link: String,
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        backfilled: bool,
    },
    Tuple(Vec<serde_json::Value>),
    Other(IgnoredAny),
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl RemoteArticle {
    fn into_article(self, tz: Tz) -> Option<Article> {
        let published = parse_timestamp(self.published.as_deref()?, tz)?;
        let title = non_empty(self.title);
        let link = non_empty(self.link);
        if title.is_none() && link.is_none() {
            return None;
        }
        let author = non_empty(self.author);
        // Older peers only record the friend's name as the author.
        let source = non_empty(self.source).or_else(|| author.clone())?;

        Some(Article {
            title: title.unwrap_or_else(|| UNTITLED.to_string()),
            link: link.unwrap_or_default(),
            published,
            summary: self.summary.unwrap_or_default(),
            author: author.unwrap_or_default(),
            source,
            avatar: self.avatar.unwrap_or_default(),
        })
    }
}

impl RemoteLostFriend {
    fn into_lost_friend(self) -> Option<LostFriend> {
        let friend = match self {
            RemoteLostFriend::Record {
                name,
                link,
                avatar,
                reason,
                backfilled,
            } => Some(LostFriend {
                name,
                link,
                avatar: avatar.unwrap_or_default(),
                reason: reason.as_deref().map(parse_reason).unwrap_or(FailureReason::Unreachable),
                backfilled,
            }),
            RemoteLostFriend::Tuple(fields) => {
                let text = |i: usize| {
                    fields
                        .get(i)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                Some(LostFriend {
                    name: text(0),
                    link: text(1),
                    avatar: text(2),
                    reason: FailureReason::Unreachable,
                    backfilled: false,
                })
            }
            RemoteLostFriend::Other(_) => None,
        };
        friend.filter(|f| !f.name.is_empty() || !f.link.is_empty())
    }
}

fn parse_reason(s: &str) -> FailureReason {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .unwrap_or(FailureReason::Unreachable)
}

/// Parse a peer `all.json` document into articles.
///
/// Returns `None` when the document as a whole is unusable; individual bad
/// articles are skipped.
pub fn parse_remote_result(bytes: &[u8], tz: Tz) -> Option<Vec<Article>> {
    let remote: RemoteResult = match serde_json::from_slice(bytes) {
        Ok(remote) => remote,
        Err(e) => {
            warn!(error = %e, "Malformed peer aggregate");
            return None;
        }
    };

    let total = remote.article_data.len();
    let articles: Vec<Article> = remote
        .article_data
        .into_iter()
        .filter_map(|value| serde_json::from_value::<RemoteArticle>(value).ok())
        .filter_map(|a| a.into_article(tz))
        .collect();

    if articles.len() < total {
        warn!(
            skipped = total - articles.len(),
            "Skipped peer articles with missing or unparseable fields"
        );
    }
    Some(articles)
}

/// Parse a peer `errors.json` document.
pub fn parse_remote_errors(bytes: &[u8]) -> Option<Vec<LostFriend>> {
    match serde_json::from_slice::<Vec<RemoteLostFriend>>(bytes) {
        Ok(entries) => Some(
            entries
                .into_iter()
                .filter_map(RemoteLostFriend::into_lost_friend)
                .collect(),
        ),
        Err(e) => {
            warn!(error = %e, "Malformed peer error list");
            None
        }
    }
}

/// Union local and remote articles; local copies win on identity conflicts.
pub fn merge_results(local: AggregateResult, remote: Vec<Article>, cap: usize) -> AggregateResult {
    let last_updated = local.last_updated;
    let mut articles = local.article_data;
    articles.extend(remote);
    AggregateResult::from_articles(articles, cap, last_updated)
}

/// Union local and remote lost friends by homepage identity; local wins.
pub fn merge_lost_friends(local: Vec<LostFriend>, remote: Vec<LostFriend>) -> Vec<LostFriend> {
    let mut seen = HashSet::new();
    local
        .into_iter()
        .chain(remote)
        .filter(|f| seen.insert(identity_key(&f.link)))
        .collect()
}

/// Fetches peer documents and merges them into local results.
pub struct RemoteMerger {
    fetcher: FeedFetcher,
    tz: Tz,
    max_articles: usize,
}

impl RemoteMerger {
    pub fn new(fetcher: FeedFetcher, tz: Tz, max_articles: usize) -> Self {
        Self {
            fetcher,
            tz,
            max_articles,
        }
    }

    pub fn from_config(fetcher: FeedFetcher, config: &Config) -> Self {
        Self::new(
            fetcher,
            parse_timezone(&config.output.timezone),
            config.spider.max_articles,
        )
    }

    /// Merge the peer `all.json` at `url` into `local`.
    pub async fn merge(&self, local: AggregateResult, url: &str) -> AggregateResult {
        let remote = match self.fetcher.fetch_document(url).await {
            Ok(bytes) => parse_remote_result(&bytes, self.tz),
            Err(e) => {
                warn!(url = %url, error = %e, "Peer aggregate unavailable, keeping local result");
                None
            }
        };
        let Some(remote) = remote else {
            return local;
        };

        let local_count = local.article_count;
        let remote_count = remote.len();
        let merged = merge_results(local, remote, self.max_articles);
        info!(
            url = %url,
            local = local_count,
            remote = remote_count,
            merged = merged.article_count,
            friends = merged.friend_count,
            "Merged peer aggregate"
        );
        merged
    }

    /// Merge the peer `errors.json` at `url` into `local`.
    pub async fn merge_errors(&self, local: Vec<LostFriend>, url: &str) -> Vec<LostFriend> {
        let remote = match self.fetcher.fetch_document(url).await {
            Ok(bytes) => parse_remote_errors(&bytes),
            Err(e) => {
                warn!(url = %url, error = %e, "Peer error list unavailable, keeping local list");
                None
            }
        };
        let Some(remote) = remote else {
            return local;
        };

        let local_count = local.len();
        let merged = merge_lost_friends(local, remote);
        info!(url = %url, local = local_count, merged = merged.len(), "Merged peer error list");
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn shanghai() -> Tz {
        parse_timezone("Asia/Shanghai")
    }

    #[test]
    fn test_parse_remote_result_legacy_fields() {
        let json = r#"{
            "statistical_data": {"friends_num": 1},
            "article_data": [
                {"title": "Old style", "created": "2024-05-01 12:00", "link": "https://peer.example/1", "author": "Peer", "avatar": "p.png"},
                {"title": "New style", "published": "2024-05-02T00:00:00Z", "link": "https://peer.example/2", "source": "Peer", "summary": null},
                {"title": "No date", "link": "https://peer.example/3", "author": "Peer"},
                {"title": "Bad date", "created": "someday", "link": "https://peer.example/4", "author": "Peer"},
                42
            ]
        }"#;

        let articles = parse_remote_result(json.as_bytes(), shanghai()).unwrap();
        assert_eq!(articles.len(), 2);

        assert_eq!(articles[0].source, "Peer");
        assert_eq!(articles[0].avatar, "p.png");
        assert_eq!(
            articles[0].published,
            Utc.with_ymd_and_hms(2024, 5, 1, 4, 0, 0).unwrap()
        );
        assert_eq!(articles[1].summary, "");
    }

    #[test]
    fn test_parse_remote_result_malformed() {
        assert!(parse_remote_result(b"<html>", shanghai()).is_none());
        assert_eq!(parse_remote_result(b"{}", shanghai()).unwrap().len(), 0);
    }

    #[test]
    fn test_parse_remote_errors_mixed() {
        let json = r#"[
            {"name": "A", "link": "https://a.example", "reason": "timeout"},
            {"name": "B", "link": "https://b.example", "reason": "exploded"},
            ["C", "https://c.example", "c.png"],
            "garbage",
            {"unrelated": {"nested": [1, 2]}},
            7
        ]"#;

        let lost = parse_remote_errors(json.as_bytes()).unwrap();
        assert_eq!(lost.len(), 3);
        assert_eq!(lost[0].reason, FailureReason::Timeout);
        assert_eq!(lost[1].reason, FailureReason::Unreachable);
        assert_eq!(lost[2].avatar, "c.png");
        assert_eq!(lost[2].reason, FailureReason::Unreachable);
    }

    #[test]
    fn test_merge_lost_friends_local_wins() {
        let local = vec![LostFriend {
            name: "A".to_string(),
            link: "https://a.example/".to_string(),
            avatar: String::new(),
            reason: FailureReason::Timeout,
            backfilled: true,
        }];
        let remote = vec![
            LostFriend {
                name: "A (peer)".to_string(),
                link: "http://a.example".to_string(),
                avatar: String::new(),
                reason: FailureReason::Unreachable,
                backfilled: false,
            },
            LostFriend {
                name: "B".to_string(),
                link: "https://b.example".to_string(),
                avatar: String::new(),
                reason: FailureReason::ParseError,
                backfilled: false,
            },
        ];

        let merged = merge_lost_friends(local, remote);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "A");
        assert!(merged[0].backfilled);
        assert_eq!(merged[1].name, "B");
    }
}
