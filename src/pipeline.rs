//! Stage orchestration.
//!
//! `run_spider` resolves friends, aggregates, optionally merges a peer's
//! documents, normalises and writes the output. `run_subscribe` runs the
//! new-post notifier. Stages never overlap.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::aggregate::{Aggregation, Aggregator};
use crate::cache::FeedCache;
use crate::config::Config;
use crate::feed::FeedFetcher;
use crate::friends::{fetch_manifest, merge_static_feeds, FriendResolver};
use crate::merge::RemoteMerger;
use crate::notify::{
    load_template, GitHubIssues, NotifierSettings, NotifyOutcome, SmtpMailer, SubscriberNotifier,
};
use crate::output::{write_documents, OutputNormalizer};
use crate::Result;

/// Run the aggregation stage and write `all.json` / `errors.json`.
///
/// Only a missing or unreadable manifest is fatal; per-friend failures end
/// up in the error document.
pub async fn run_spider(config: &Config) -> Result<Aggregation> {
    run_spider_at(config, Utc::now()).await
}

/// [`run_spider`] with a fixed clock.
pub async fn run_spider_at(config: &Config, now: DateTime<Utc>) -> Result<Aggregation> {
    let fetcher = FeedFetcher::from_config(config)?;

    let manifest_url = config.spider.manifest_url.trim();
    let friends = if manifest_url.is_empty() {
        Vec::new()
    } else {
        fetch_manifest(&fetcher, manifest_url).await?
    };
    let friends = merge_static_feeds(friends, &config.spider.static_feeds);
    info!(friends = friends.len(), "Resolved friend list");

    let mut cache = FeedCache::load(&config.cache.path);
    let aggregator = Aggregator::from_config(config)?;
    let Aggregation { mut result, mut lost } = aggregator.aggregate(&friends, &mut cache, now).await;

    if let Err(e) = cache.save(&config.cache.path) {
        warn!(path = %config.cache.path, error = %e, "Failed to save cache");
    }

    if config.merge.enabled {
        let merger = RemoteMerger::from_config(fetcher.clone(), config);
        let base = config.merge.base_url.trim_end_matches('/');
        result = merger
            .merge(result, &format!("{base}/{}", config.output.all_file))
            .await;
        lost = merger
            .merge_errors(lost, &format!("{base}/{}", config.output.errors_file))
            .await;
    }

    OutputNormalizer::from_config(config).normalize(&mut result);
    write_documents(&config.output, &result, &lost)?;

    Ok(Aggregation { result, lost })
}

/// Run the subscriber notifier.
///
/// Missing SMTP settings disable the stage with an error log.
pub async fn run_subscribe(config: &Config) -> Result<Option<NotifyOutcome>> {
    if !config.smtp.is_ready() {
        error!("SMTP email, server or password missing, skipping subscriber notifications");
        return Ok(None);
    }

    let fetcher = FeedFetcher::from_config(config)?;
    let resolver = FriendResolver::new(fetcher.clone(), &config.spider);
    let notifier = SubscriberNotifier::new(
        fetcher,
        resolver,
        NotifierSettings::from_config(config),
        load_template(&config.subscribe.template_path)?,
        Box::new(GitHubIssues::new(&config.subscribe)?),
        Box::new(SmtpMailer::new(&config.smtp)?),
    );

    let outcome = notifier.run().await?;
    info!(?outcome, "Subscriber notifications finished");
    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_subscribe_without_smtp_is_skipped() {
        let mut config = Config::default();
        config.subscribe.enabled = true;
        config.subscribe.blog_url = "https://blog.example".to_string();

        let outcome = run_subscribe(&config).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_run_spider_manifest_failure_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/friends.json")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.spider.allow_private_hosts = true;
        config.spider.manifest_url = format!("{}/friends.json", server.url());
        config.output.dir = dir.path().to_string_lossy().into_owned();
        config.cache.path = dir.path().join("cache.json").to_string_lossy().into_owned();

        let result = run_spider(&config).await;
        assert!(matches!(result, Err(crate::FriendCircleError::Manifest(_))));
        assert!(!dir.path().join("all.json").exists());
    }
}
