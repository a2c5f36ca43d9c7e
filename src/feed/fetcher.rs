//! Feed fetcher with security measures.
//!
//! This module fetches feed documents (and peer JSON documents) with SSRF
//! protection and size limits, classifying every failure into a
//! [`FailureReason`](super::FailureReason).

use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use tracing::debug;

use super::parser::parse_feed;
use super::types::{FetchError, FetchedFeed};
use crate::config::{Config, SpiderConfig};
use crate::datetime::{parse_timezone, DEFAULT_TIMEZONE};
use crate::{FriendCircleError, Result};

/// User agent string for outgoing requests.
const USER_AGENT: &str = concat!("friend-circle/", env!("CARGO_PKG_VERSION"), " (Feed Aggregator)");

/// Feed fetcher with security measures.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    max_feed_size: u64,
    allow_private_hosts: bool,
    timezone: Tz,
}

impl FeedFetcher {
    /// Create a new fetcher from the spider settings.
    pub fn new(config: &SpiderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FriendCircleError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
            allow_private_hosts: config.allow_private_hosts,
            timezone: parse_timezone(DEFAULT_TIMEZONE),
        })
    }

    /// Create a fetcher that reads naive feed dates in `output.timezone`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(&config.spider)?.with_timezone(parse_timezone(&config.output.timezone)))
    }

    /// Timezone used for feed dates that carry no offset.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Fetch and parse a feed, returning at most `max_articles` entries.
    ///
    /// Undated entries are stamped with `now`.
    pub async fn fetch(
        &self,
        url: &str,
        max_articles: usize,
        now: DateTime<Utc>,
    ) -> std::result::Result<FetchedFeed, FetchError> {
        let bytes = self.get_bytes(url, None).await?;
        parse_feed(&bytes, url, max_articles, now, self.timezone)
    }

    /// Like [`fetch`](Self::fetch) but with a shorter per-request timeout,
    /// used when probing candidate feed paths.
    pub async fn probe(
        &self,
        url: &str,
        max_articles: usize,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> std::result::Result<FetchedFeed, FetchError> {
        let bytes = self.get_bytes(url, Some(timeout)).await?;
        parse_feed(&bytes, url, max_articles, now, self.timezone)
    }

    /// Fetch a raw document body (manifest, peer JSON) under the same limits.
    pub async fn fetch_document(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        self.get_bytes(url, None).await
    }

    async fn get_bytes(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> std::result::Result<Vec<u8>, FetchError> {
        if !self.allow_private_hosts {
            validate_url(url).map_err(|e| FetchError::unreachable(format!("{url}: {e}")))?;
        }

        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = %status, "Non-success response");
            return Err(FetchError::http_status(url, status));
        }

        // Check content length if available
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(FetchError::parse_error(format!(
                    "{url}: document too large: {content_length} bytes (max {} bytes)",
                    self.max_feed_size
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_transport(url, &e))?;

        // Check actual size
        if bytes.len() as u64 > self.max_feed_size {
            return Err(FetchError::parse_error(format!(
                "{url}: document too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_feed_size
            )));
        }

        Ok(bytes.to_vec())
    }
}

/// Validate a URL for SSRF protection.
///
/// This function checks that:
/// - The URL uses http or https scheme
/// - The host is not a private/loopback address
/// - The host is not a reserved hostname
pub fn validate_url(url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| FriendCircleError::Validation(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FriendCircleError::Validation(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| FriendCircleError::Validation("URL has no host".to_string()))?;

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(FriendCircleError::Validation(format!(
                    "forbidden host: {domain}"
                )));
            }
            return Ok(());
        }
        url::Host::Ipv4(ipv4) => IpAddr::V4(ipv4),
        url::Host::Ipv6(ipv6) => IpAddr::V6(ipv6),
    };

    if is_private_ip(&ip) {
        return Err(FriendCircleError::Validation(format!(
            "private IP address not allowed: {ip}"
        )));
    }

    Ok(())
}

/// Check if a hostname is forbidden.
fn is_forbidden_hostname(host: &str) -> bool {
    let host_lower = host.to_lowercase();

    if host_lower == "localhost" {
        return true;
    }

    const FORBIDDEN_SUFFIXES: [&str; 7] = [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];

    FORBIDDEN_SUFFIXES
        .iter()
        .any(|suffix| host_lower.ends_with(suffix))
}

/// Check if an IP address is private/reserved.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();

            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                // Documentation: 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
                || (octets[0] == 192 && octets[1] == 0 && octets[2] == 2)
                || (octets[0] == 198 && octets[1] == 51 && octets[2] == 100)
                || (octets[0] == 203 && octets[1] == 0 && octets[2] == 113)
        }
        IpAddr::V6(ipv6) => {
            let segments = ipv6.segments();

            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // Unique local: fc00::/7
                || (segments[0] & 0xfe00) == 0xfc00
                // Link-local: fe80::/10
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}
