//! Configuration module for friend-circle.

use serde::Deserialize;
use std::path::Path;

use crate::{FriendCircleError, Result};

/// A feed supplied directly in configuration instead of being discovered.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StaticFeedConfig {
    /// Display name of the friend.
    pub name: String,
    /// Feed URL.
    pub url: String,
    /// Homepage of the friend (derived from the feed URL when absent).
    #[serde(default)]
    pub link: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Feed aggregation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SpiderConfig {
    /// Whether the aggregation stage runs.
    #[serde(default = "default_spider_enabled")]
    pub enabled: bool,
    /// URL of the friend manifest JSON document.
    #[serde(default)]
    pub manifest_url: String,
    /// Maximum articles taken from each feed.
    #[serde(default = "default_articles_per_feed")]
    pub articles_per_feed: usize,
    /// Maximum articles in the aggregate output.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    /// Maximum friends processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deadline for one friend (discovery + fetch) in seconds.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    /// Total timeout for a single discovery probe in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// Allow loopback/private hosts (tests and intranet deployments).
    #[serde(default)]
    pub allow_private_hosts: bool,
    /// Conventional feed paths probed in order when a friend has no feed URL.
    #[serde(default = "default_feed_paths")]
    pub feed_paths: Vec<String>,
    /// Feeds configured directly.
    #[serde(default)]
    pub static_feeds: Vec<StaticFeedConfig>,
}

fn default_spider_enabled() -> bool {
    true
}

fn default_articles_per_feed() -> usize {
    5
}

fn default_max_articles() -> usize {
    150
}

fn default_concurrency() -> usize {
    10
}

fn default_task_timeout() -> u64 {
    60
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_feed_paths() -> Vec<String> {
    [
        "/atom.xml",
        "/rss2.xml",
        "/rss.xml",
        "/feed/",
        "/feed",
        "/index.xml",
        "/rss",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            enabled: default_spider_enabled(),
            manifest_url: String::new(),
            articles_per_feed: default_articles_per_feed(),
            max_articles: default_max_articles(),
            concurrency: default_concurrency(),
            task_timeout_secs: default_task_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            allow_private_hosts: false,
            feed_paths: default_feed_paths(),
            static_feeds: Vec::new(),
        }
    }
}

/// Remote merge configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MergeConfig {
    /// Whether peer results are merged in.
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the peer deployment (`<base>/all.json`, `<base>/errors.json`).
    #[serde(default)]
    pub base_url: String,
}

/// Per-friend cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Path to the cache file.
    #[serde(default = "default_cache_path")]
    pub path: String,
    /// Entries older than this are neither used for backfill nor kept.
    #[serde(default = "default_cache_max_age")]
    pub max_age_days: i64,
}

fn default_cache_path() -> String {
    "temp/cache.json".to_string()
}

fn default_cache_max_age() -> i64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            max_age_days: default_cache_max_age(),
        }
    }
}

/// Output documents configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory the documents are written to.
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// File name of the aggregate document.
    #[serde(default = "default_all_file")]
    pub all_file: String,
    /// File name of the lost friends document.
    #[serde(default = "default_errors_file")]
    pub errors_file: String,
    /// Maximum summary length in characters.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    /// Timezone for naive timestamps and notification formatting.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_all_file() -> String {
    "all.json".to_string()
}

fn default_errors_file() -> String {
    "errors.json".to_string()
}

fn default_summary_max_chars() -> usize {
    300
}

fn default_timezone() -> String {
    crate::datetime::DEFAULT_TIMEZONE.to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            all_file: default_all_file(),
            errors_file: default_errors_file(),
            summary_max_chars: default_summary_max_chars(),
            timezone: default_timezone(),
        }
    }
}

/// Subscriber notification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeConfig {
    /// Whether new-post notifications are sent.
    #[serde(default)]
    pub enabled: bool,
    /// Homepage or feed URL of the owning blog.
    #[serde(default)]
    pub blog_url: String,
    /// Number of recent posts compared between runs.
    #[serde(default = "default_feed_count")]
    pub feed_count: usize,
    /// Path of the last-seen snapshot.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    /// Path of the HTML mail template.
    #[serde(default = "default_template_path")]
    pub template_path: String,
    /// Title of the owning website.
    #[serde(default)]
    pub website_title: String,
    /// GitHub repository holding subscription issues ("owner/repo").
    #[serde(default)]
    pub github_repo: String,
    /// Label marking subscription issues.
    #[serde(default = "default_issue_label")]
    pub issue_label: String,
    /// GitHub API token (usually from `GITHUB_TOKEN`).
    #[serde(default)]
    pub github_token: Option<String>,
}

fn default_feed_count() -> usize {
    5
}

fn default_snapshot_path() -> String {
    "temp/newest_posts.json".to_string()
}

fn default_template_path() -> String {
    "templates/email.html".to_string()
}

fn default_issue_label() -> String {
    "subscribed".to_string()
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            blog_url: String::new(),
            feed_count: default_feed_count(),
            snapshot_path: default_snapshot_path(),
            template_path: default_template_path(),
            website_title: String::new(),
            github_repo: String::new(),
            issue_label: default_issue_label(),
            github_token: None,
        }
    }
}

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// Sender address (also the login user).
    #[serde(default)]
    pub email: String,
    /// SMTP server host.
    #[serde(default)]
    pub server: String,
    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Use implicit TLS.
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Password (usually from `SMTP_PWD`).
    #[serde(default)]
    pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
    465
}

fn default_use_tls() -> bool {
    true
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            server: String::new(),
            port: default_smtp_port(),
            use_tls: default_use_tls(),
            password: None,
        }
    }
}

impl SmtpConfig {
    /// Whether every field needed to log in is present.
    pub fn is_ready(&self) -> bool {
        !self.email.is_empty()
            && !self.server.is_empty()
            && self.port != 0
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; stdout only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Feed aggregation.
    #[serde(default)]
    pub spider: SpiderConfig,
    /// Remote merge.
    #[serde(default)]
    pub merge: MergeConfig,
    /// Per-friend cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Output documents.
    #[serde(default)]
    pub output: OutputConfig,
    /// Subscriber notifications.
    #[serde(default)]
    pub subscribe: SubscribeConfig,
    /// SMTP.
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FriendCircleError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FriendCircleError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `SMTP_PWD`: SMTP password
    /// - `FCL_REPO`: subscription repository ("owner/repo")
    /// - `GITHUB_TOKEN`: GitHub API token
    pub fn apply_env_overrides(&mut self) {
        if let Some(password) = non_empty_env("SMTP_PWD") {
            self.smtp.password = Some(password);
        }
        if let Some(repo) = non_empty_env("FCL_REPO") {
            self.subscribe.github_repo = repo;
        }
        if let Some(token) = non_empty_env("GITHUB_TOKEN") {
            self.subscribe.github_token = Some(token);
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if an enabled stage is missing a value it cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.spider.enabled {
            if self.spider.manifest_url.trim().is_empty() && self.spider.static_feeds.is_empty() {
                return Err(FriendCircleError::Validation(
                    "spider is enabled but neither manifest_url nor static_feeds is set".to_string(),
                ));
            }
            if self.spider.concurrency == 0 {
                return Err(FriendCircleError::Validation(
                    "spider.concurrency must be at least 1".to_string(),
                ));
            }
            if self.spider.max_articles == 0 || self.spider.articles_per_feed == 0 {
                return Err(FriendCircleError::Validation(
                    "spider.max_articles and spider.articles_per_feed must be positive".to_string(),
                ));
            }
        }
        if self.merge.enabled && self.merge.base_url.trim().is_empty() {
            return Err(FriendCircleError::Validation(
                "merge is enabled but merge.base_url is not set".to_string(),
            ));
        }
        if self.subscribe.enabled {
            if self.subscribe.blog_url.trim().is_empty() {
                return Err(FriendCircleError::Validation(
                    "subscribe is enabled but subscribe.blog_url is not set".to_string(),
                ));
            }
            if self.subscribe.github_repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
                return Err(FriendCircleError::Validation(format!(
                    "subscribe.github_repo must look like \"owner/repo\", got {:?}. \
                     Set it in config.toml or via FCL_REPO environment variable.",
                    self.subscribe.github_repo
                )));
            }
        }
        if self.cache.max_age_days < 0 {
            return Err(FriendCircleError::Validation(
                "cache.max_age_days must not be negative".to_string(),
            ));
        }
        if chrono::Duration::try_days(self.cache.max_age_days).is_none() {
            return Err(FriendCircleError::Validation(format!(
                "cache.max_age_days is too large: {}",
                self.cache.max_age_days
            )));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
