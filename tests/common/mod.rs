//! Test helpers for integration tests.
//!
//! Provides feed document builders, a test configuration and in-memory
//! notification collaborators.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use friend_circle::config::Config;
use friend_circle::notify::{MailSender, OutgoingMail, SubscriberSource};
use friend_circle::{Article, FriendCircleError, Result};

/// A feed entry for the document builders.
pub struct Item<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub published: DateTime<Utc>,
}

/// Midnight UTC on the given day of June 2025.
pub fn june(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap()
}

/// Build an Atom document.
pub fn atom_feed(title: &str, items: &[Item<'_>]) -> String {
    let entries: String = items
        .iter()
        .map(|item| {
            format!(
                r#"<entry><title>{}</title><link rel="alternate" href="{}"/><id>{}</id><published>{}</published><updated>{}</updated><summary>About {}</summary></entry>"#,
                xml_text(item.title),
                item.link,
                item.link,
                item.published.to_rfc3339(),
                item.published.to_rfc3339(),
                xml_text(item.title)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><feed xmlns="http://www.w3.org/2005/Atom"><title>{title}</title><id>urn:test:{title}</id><updated>2025-06-01T00:00:00Z</updated>{entries}</feed>"#
    )
}

fn xml_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Build an RSS 2.0 document with no items.
pub fn empty_rss(title: &str) -> String {
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{title}</title><link>https://example.com</link><description>empty</description></channel></rss>"#
    )
}

/// An article attributed to `source`.
pub fn article(source: &str, link: &str, published: DateTime<Utc>) -> Article {
    Article {
        title: format!("{source} post"),
        link: link.to_string(),
        published,
        summary: String::new(),
        author: String::new(),
        source: source.to_string(),
        avatar: String::new(),
    }
}

/// A configuration that writes everything under `dir` and may talk to
/// local mock servers.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.spider.allow_private_hosts = true;
    config.spider.task_timeout_secs = 5;
    config.spider.probe_timeout_secs = 2;
    config.output.dir = dir.join("out").to_string_lossy().into_owned();
    config.cache.path = dir.join("cache.json").to_string_lossy().into_owned();
    config.subscribe.snapshot_path = dir.join("newest_posts.json").to_string_lossy().into_owned();
    config.subscribe.website_title = "My Blog".to_string();
    config
}

/// Records every mail and optionally fails each delivery.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<OutgoingMail>>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn mails(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        if self.fail {
            return Err(FriendCircleError::Mail("connection refused".to_string()));
        }
        Ok(())
    }
}

/// A fixed subscriber list.
pub struct StaticSubscribers(pub Vec<String>);

#[async_trait]
impl SubscriberSource for StaticSubscribers {
    async fn subscribers(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}
