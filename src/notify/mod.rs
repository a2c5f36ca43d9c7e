//! New-post notifications for the owning blog.
//!
//! Each run fetches the blog's own feed, compares it with the snapshot
//! saved by the previous run and mails every new post to every subscriber.
//! The snapshot is replaced as soon as the comparison is done, so failed
//! deliveries are not retried on the next run. A failed feed fetch leaves
//! the snapshot untouched.

mod github;
mod mail;

pub use github::GitHubIssues;
pub use mail::{build_message, SmtpMailer};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::datetime::format_published;
use crate::feed::{Article, FeedFetcher, FetchError};
use crate::friends::{Friend, FriendResolver};
use crate::output::write_json;
use crate::template::{Template, TemplateContext};
use crate::Result;

/// Template used when the configured template file does not exist.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/email.html");

/// One message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// HTML body rendered from the template.
    pub html: String,
}

/// Delivers notification mails.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// Supplies subscriber e-mail addresses.
#[async_trait]
pub trait SubscriberSource: Send + Sync {
    async fn subscribers(&self) -> Result<Vec<String>>;
}

/// What a notifier run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The blog's feed could not be fetched; nothing changed.
    FetchFailed,
    /// No snapshot existed; the current posts were recorded and nothing sent.
    Baseline { articles: usize },
    /// Nothing new since the last run.
    NoNewArticles,
    /// New posts were found and dispatched.
    Notified {
        new_articles: usize,
        subscribers: usize,
        sent: usize,
        failed: usize,
    },
}

/// Settings for a [`SubscriberNotifier`].
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub blog_url: String,
    pub feed_count: usize,
    pub snapshot_path: PathBuf,
    pub website_title: String,
    pub github_issue_url: String,
    pub timezone: String,
}

impl NotifierSettings {
    pub fn from_config(config: &Config) -> Self {
        let subscribe = &config.subscribe;
        let repo = subscribe.github_repo.trim().trim_matches('/');
        Self {
            blog_url: subscribe.blog_url.clone(),
            feed_count: subscribe.feed_count,
            snapshot_path: PathBuf::from(&subscribe.snapshot_path),
            website_title: subscribe.website_title.clone(),
            github_issue_url: if repo.is_empty() {
                String::new()
            } else {
                format!("https://github.com/{repo}/issues?q=is%3Aissue+is%3Aclosed")
            },
            timezone: config.output.timezone.clone(),
        }
    }

    fn source_name(&self) -> &str {
        if self.website_title.is_empty() {
            &self.blog_url
        } else {
            &self.website_title
        }
    }
}

/// Detects new posts on the owning blog and mails subscribers.
pub struct SubscriberNotifier {
    fetcher: FeedFetcher,
    resolver: FriendResolver,
    settings: NotifierSettings,
    template: String,
    subscribers: Box<dyn SubscriberSource>,
    mailer: Box<dyn MailSender>,
}

impl SubscriberNotifier {
    pub fn new(
        fetcher: FeedFetcher,
        resolver: FriendResolver,
        settings: NotifierSettings,
        template: String,
        subscribers: Box<dyn SubscriberSource>,
        mailer: Box<dyn MailSender>,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            settings,
            template,
            subscribers,
            mailer,
        }
    }

    /// Run one detection and dispatch cycle.
    ///
    /// Errors are returned only for snapshot I/O and template failures;
    /// fetch, subscriber lookup and delivery failures are logged.
    pub async fn run(&self) -> Result<NotifyOutcome> {
        let current = match self.fetch_own_feed().await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(
                    url = %self.settings.blog_url,
                    reason = %e.reason,
                    error = %e.message,
                    "Own feed unavailable, snapshot left unchanged"
                );
                return Ok(NotifyOutcome::FetchFailed);
            }
        };

        let previous = load_snapshot(&self.settings.snapshot_path);
        let fresh = previous.as_deref().map(|seen| new_articles(seen, &current));
        write_json(&self.settings.snapshot_path, &current)?;

        let Some(fresh) = fresh else {
            info!(articles = current.len(), "No snapshot yet, recorded baseline");
            return Ok(NotifyOutcome::Baseline {
                articles: current.len(),
            });
        };
        if fresh.is_empty() {
            info!("No new posts");
            return Ok(NotifyOutcome::NoNewArticles);
        }
        info!(new_articles = fresh.len(), "Found new posts");

        let subscribers = match self.subscribers.subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                error!(error = %e, "Failed to load subscribers");
                Vec::new()
            }
        };
        if subscribers.is_empty() {
            info!("No subscribers to notify");
        }

        let mut sent = 0;
        let mut failed = 0;
        for article in &fresh {
            let (body, html) = self.compose(article)?;
            let subject = format!("{} new post: {}", self.settings.website_title, article.title);
            for to in &subscribers {
                let mail = OutgoingMail {
                    to: to.clone(),
                    subject: subject.clone(),
                    body: body.clone(),
                    html: html.clone(),
                };
                match self.mailer.send(&mail).await {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(to = %to, title = %article.title, error = %e, "Notification failed");
                    }
                }
            }
        }

        info!(
            new_articles = fresh.len(),
            subscribers = subscribers.len(),
            sent,
            failed,
            "Notifications dispatched"
        );
        Ok(NotifyOutcome::Notified {
            new_articles: fresh.len(),
            subscribers: subscribers.len(),
            sent,
            failed,
        })
    }

    async fn fetch_own_feed(&self) -> std::result::Result<Vec<Article>, FetchError> {
        let limit = self.settings.feed_count;
        let now = Utc::now();
        let feed = match self.fetcher.fetch(&self.settings.blog_url, limit, now).await {
            Ok(feed) => feed,
            Err(e) if e.got_response() => {
                debug!(url = %self.settings.blog_url, error = %e, "Not a feed, probing for one");
                let blog = Friend {
                    name: self.settings.source_name().to_string(),
                    link: self.settings.blog_url.clone(),
                    feed_url: None,
                    avatar: String::new(),
                };
                self.resolver.discover(&blog, limit, now).await?.1
            }
            Err(e) => return Err(e),
        };

        let source = self.settings.source_name();
        Ok(feed
            .entries
            .into_iter()
            .map(|entry| entry.into_article(source, ""))
            .collect())
    }

    fn compose(&self, article: &Article) -> Result<(String, String)> {
        let published = format_published(&article.published, &self.settings.timezone);

        let body = format!(
            "Title: {}\nLink: {}\nSummary: {}\nPublished: {}",
            article.title, article.link, article.summary, published
        );

        let mut context = TemplateContext::new();
        context.set("title", article.title.as_str());
        context.set("summary", article.summary.as_str());
        context.set("published", published);
        context.set("link", article.link.as_str());
        context.set("website_title", self.settings.website_title.as_str());
        context.set("github_issue_url", self.settings.github_issue_url.as_str());
        let html = Template::parse(&self.template)?.render(&context);

        Ok((body, html))
    }
}

/// Read the mail template, falling back to the built-in one when missing.
pub fn load_template<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Template not found, using built-in");
            Ok(DEFAULT_TEMPLATE.to_string())
        }
        Err(e) => Err(e.into()),
    }
}

/// Read the last-seen snapshot. `None` when no usable snapshot exists.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Option<Vec<Article>> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to read snapshot");
            }
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(articles) => Some(articles),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt snapshot, recording a new baseline");
            None
        }
    }
}

/// Articles of `current` whose identity is not in `seen`, in feed order.
pub fn new_articles(seen: &[Article], current: &[Article]) -> Vec<Article> {
    let known: HashSet<String> = seen.iter().map(Article::identity).collect();
    current
        .iter()
        .filter(|a| !known.contains(&a.identity()))
        .cloned()
        .collect()
}
