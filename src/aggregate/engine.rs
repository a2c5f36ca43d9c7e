//! Bounded fan-out over friends, sequential fan-in.
//!
//! Each friend runs as an independent task under its own deadline; at most
//! `concurrency` tasks are in flight. Tasks only return values: the cache,
//! the article collection and the lost list are mutated by the collector
//! after all tasks finish, in manifest order.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::{AggregateResult, LostFriend};
use crate::cache::FeedCache;
use crate::config::Config;
use crate::feed::{Article, FeedFetcher, FetchError, FetchedFeed};
use crate::friends::{Friend, FriendResolver};
use crate::Result;

/// Limits applied by the [`Aggregator`].
#[derive(Debug, Clone)]
pub struct AggregateSettings {
    /// Articles kept per feed.
    pub articles_per_feed: usize,
    /// Articles kept in the aggregate.
    pub max_articles: usize,
    /// Friends processed concurrently.
    pub concurrency: usize,
    /// Deadline for one friend, discovery included.
    pub task_timeout: Duration,
    /// Oldest cache entry usable for backfill.
    pub cache_max_age: chrono::Duration,
}

impl AggregateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            articles_per_feed: config.spider.articles_per_feed,
            max_articles: config.spider.max_articles,
            concurrency: config.spider.concurrency.max(1),
            task_timeout: Duration::from_secs(config.spider.task_timeout_secs),
            cache_max_age: chrono::Duration::try_days(config.cache.max_age_days)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

/// Output of one aggregation run.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// The aggregate document.
    pub result: AggregateResult,
    /// Friends whose fetch failed, in manifest order.
    pub lost: Vec<LostFriend>,
}

/// How a friend's feed is obtained.
#[derive(Debug, Clone)]
enum FeedPlan {
    /// Feed URL given by the manifest or static list; no discovery.
    Known(String),
    /// Feed URL remembered from an earlier run; discovery on failure.
    Remembered(String),
    /// Probe conventional paths.
    Discover,
}

type FriendOutcome = std::result::Result<(String, FetchedFeed), FetchError>;

/// The aggregation engine.
pub struct Aggregator {
    fetcher: FeedFetcher,
    resolver: FriendResolver,
    settings: AggregateSettings,
}

impl Aggregator {
    /// Create an aggregator from its parts.
    pub fn new(fetcher: FeedFetcher, resolver: FriendResolver, settings: AggregateSettings) -> Self {
        Self {
            fetcher,
            resolver,
            settings,
        }
    }

    /// Create an aggregator from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = FeedFetcher::from_config(config)?;
        let resolver = FriendResolver::new(fetcher.clone(), &config.spider);
        Ok(Self::new(fetcher, resolver, AggregateSettings::from_config(config)))
    }

    /// Fetch every friend and fold the outcomes into an aggregate.
    ///
    /// Successful fetches overwrite their cache entries; failed friends are
    /// recorded as lost and backfilled from a fresh cache entry when one
    /// exists. Stale cache entries are pruned before returning.
    pub async fn aggregate(
        &self,
        friends: &[Friend],
        cache: &mut FeedCache,
        now: DateTime<Utc>,
    ) -> Aggregation {
        info!(
            attempted = friends.len(),
            concurrency = self.settings.concurrency,
            "Fetching friend feeds"
        );

        let plans: Vec<FeedPlan> = friends.iter().map(|f| plan_for(f, cache)).collect();

        let mut outcomes: Vec<(usize, FriendOutcome)> = stream::iter(friends.iter().zip(plans).enumerate())
            .map(|(index, (friend, plan))| async move { (index, self.run_with_deadline(friend, plan, now).await) })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut articles: Vec<Article> = Vec::new();
        let mut lost = Vec::new();
        let mut backfilled_count = 0usize;

        for (index, outcome) in outcomes {
            let friend = &friends[index];
            let key = friend.key();

            match outcome {
                Ok((feed_url, feed)) => {
                    let fetched: Vec<Article> = feed
                        .entries
                        .into_iter()
                        .map(|e| e.into_article(&friend.name, &friend.avatar))
                        .collect();
                    debug!(
                        friend = %friend.name,
                        url = %feed_url,
                        format = feed.format,
                        articles = fetched.len(),
                        "Fetched feed"
                    );
                    cache.record_success(key, &friend.name, Some(feed_url), fetched.clone(), now);
                    articles.extend(fetched);
                }
                Err(e) => {
                    let cached = cache.fresh_entry(&key, now, self.settings.cache_max_age);
                    let backfilled = cached.is_some_and(|entry| !entry.articles.is_empty());
                    if let Some(entry) = cached {
                        articles.extend(entry.articles.iter().cloned());
                    }
                    if backfilled {
                        backfilled_count += 1;
                    }
                    warn!(
                        friend = %friend.name,
                        link = %friend.link,
                        reason = %e.reason,
                        backfilled,
                        error = %e.message,
                        "Friend feed failed"
                    );
                    lost.push(LostFriend {
                        name: friend.name.clone(),
                        link: friend.link.clone(),
                        avatar: friend.avatar.clone(),
                        reason: e.reason,
                        backfilled,
                    });
                }
            }
        }

        let pruned = cache.prune(now, self.settings.cache_max_age);
        let result = AggregateResult::from_articles(articles, self.settings.max_articles, now);

        info!(
            attempted = friends.len(),
            succeeded = friends.len() - lost.len(),
            lost = lost.len(),
            backfilled = backfilled_count,
            articles = result.article_count,
            pruned,
            "Aggregation finished"
        );

        Aggregation { result, lost }
    }

    async fn run_with_deadline(&self, friend: &Friend, plan: FeedPlan, now: DateTime<Utc>) -> FriendOutcome {
        let deadline = self.settings.task_timeout;
        match tokio::time::timeout(deadline, self.run_friend(friend, plan, now)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::timeout(format!(
                "{}: no result within {deadline:?}",
                friend.link
            ))),
        }
    }

    async fn run_friend(&self, friend: &Friend, plan: FeedPlan, now: DateTime<Utc>) -> FriendOutcome {
        let limit = self.settings.articles_per_feed;
        match plan {
            FeedPlan::Known(url) => self.fetcher.fetch(&url, limit, now).await.map(|feed| (url, feed)),
            FeedPlan::Remembered(url) => match self.fetcher.fetch(&url, limit, now).await {
                Ok(feed) => Ok((url, feed)),
                Err(e) => {
                    debug!(friend = %friend.name, url = %url, error = %e, "Remembered feed failed, probing");
                    self.resolver.discover(friend, limit, now).await
                }
            },
            FeedPlan::Discover => self.resolver.discover(friend, limit, now).await,
        }
    }
}

fn plan_for(friend: &Friend, cache: &FeedCache) -> FeedPlan {
    if let Some(url) = &friend.feed_url {
        return FeedPlan::Known(url.clone());
    }
    match cache.feed_url_hint(&friend.key()) {
        Some(url) => FeedPlan::Remembered(url.to_string()),
        None => FeedPlan::Discover,
    }
}
