//! Feed document parsing.
//!
//! feed-rs does the schema work; the document's detected type picks an
//! [`ExtractionStrategy`] that decides which entry fields become the link,
//! summary and timestamp of a [`FeedEntry`].

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use feed_rs::model::{Entry, FeedType};
use feed_rs::parser;
use tracing::debug;
use url::Url;

use crate::datetime::parse_timestamp;

use super::types::{FeedEntry, FetchError, FetchedFeed, MAX_SUMMARY_CHARS, UNTITLED};

/// Longest entity name considered when decoding `&name;`.
const MAX_ENTITY_LEN: usize = 10;

/// Field selection rules for one family of feed documents.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionStrategy {
    /// Strategy name, used in logs.
    pub name: &'static str,
    link: fn(&Entry) -> Option<String>,
    summary: fn(&Entry) -> Option<String>,
    timestamp: fn(&Entry) -> Option<DateTime<Utc>>,
}

/// RSS 0.9x / 1.0 / 2.0: `<link>` is the article, `<description>` the summary.
const RSS: ExtractionStrategy = ExtractionStrategy {
    name: "rss",
    link: first_link,
    summary: summary_then_content,
    timestamp: published_then_updated,
};

/// Atom: pick the `alternate` link, skipping `self`, `edit` and `replies`.
const ATOM: ExtractionStrategy = ExtractionStrategy {
    name: "atom",
    link: alternate_link,
    summary: summary_then_content,
    timestamp: published_then_updated,
};

/// JSON Feed: `url` is the article, `summary` falls back to content.
const JSON_FEED: ExtractionStrategy = ExtractionStrategy {
    name: "json",
    link: first_link,
    summary: summary_then_content,
    timestamp: published_then_updated,
};

/// Pick the strategy for a detected document type.
pub fn strategy_for(feed_type: &FeedType) -> ExtractionStrategy {
    match feed_type {
        FeedType::Atom => ATOM,
        FeedType::JSON => JSON_FEED,
        FeedType::RSS0 | FeedType::RSS1 | FeedType::RSS2 => RSS,
    }
}

fn first_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .map(|l| l.href.trim())
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

fn alternate_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")) && !l.href.trim().is_empty())
        .map(|l| l.href.trim().to_string())
        .or_else(|| first_link(entry))
}

fn summary_then_content(entry: &Entry) -> Option<String> {
    entry
        .summary
        .as_ref()
        .map(|t| t.content.clone())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
}

fn published_then_updated(entry: &Entry) -> Option<DateTime<Utc>> {
    entry.published.or(entry.updated)
}

/// Parse a feed document into at most `max_entries` normalised entries.
///
/// Relative links are resolved against `base_url`. Entries with neither a
/// title nor a link are skipped; entries without a timestamp get `fetched_at`.
/// Entry dates go through [`parse_timestamp`], so naive dates are read in `tz`.
pub fn parse_feed(
    bytes: &[u8],
    base_url: &str,
    max_entries: usize,
    fetched_at: DateTime<Utc>,
    tz: Tz,
) -> Result<FetchedFeed, FetchError> {
    let feed = parser::Builder::new()
        .timestamp_parser(move |text| parse_timestamp(text, tz))
        .build()
        .parse(bytes)
        .map_err(|e| FetchError::parse_error(format!("{base_url}: failed to parse feed: {e}")))?;

    let strategy = strategy_for(&feed.feed_type);
    let base = Url::parse(base_url).ok();

    let title = feed
        .title
        .map(|t| collapse_whitespace(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled Feed".to_string());

    let mut entries = Vec::new();
    for entry in &feed.entries {
        if entries.len() >= max_entries {
            break;
        }
        match normalize_entry(&strategy, entry, base.as_ref(), fetched_at) {
            Some(normalized) => entries.push(normalized),
            None => debug!(feed = %base_url, id = %entry.id, "Skipping entry without title or link"),
        }
    }

    Ok(FetchedFeed {
        title,
        format: strategy.name,
        entries,
    })
}

fn normalize_entry(
    strategy: &ExtractionStrategy,
    entry: &Entry,
    base: Option<&Url>,
    fetched_at: DateTime<Utc>,
) -> Option<FeedEntry> {
    let title = entry
        .title
        .as_ref()
        .map(|t| collapse_whitespace(&t.content))
        .filter(|t| !t.is_empty());
    let link = (strategy.link)(entry).map(|href| resolve_link(base, &href));

    if title.is_none() && link.is_none() {
        return None;
    }

    let summary = (strategy.summary)(entry)
        .map(|s| truncate_chars(&strip_html(&s), MAX_SUMMARY_CHARS))
        .unwrap_or_default();
    let author = entry
        .authors
        .iter()
        .map(|a| a.name.trim())
        .find(|name| !name.is_empty())
        .unwrap_or_default()
        .to_string();

    Some(FeedEntry {
        title: title.unwrap_or_else(|| UNTITLED.to_string()),
        link: link.unwrap_or_default(),
        published: (strategy.timestamp)(entry).unwrap_or(fetched_at),
        summary,
        author,
    })
}

/// Resolve a possibly relative link against the feed URL.
fn resolve_link(base: Option<&Url>, href: &str) -> String {
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    base.and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Elements whose text is never shown.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style"];

/// Strip HTML tags from text, decoding common entities.
///
/// The contents of `<script>` and `<style>` elements are dropped.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut tag: Option<String> = None;
    let mut hidden: Option<&'static str> = None;
    let mut entity: Option<String> = None;
    let mut chars = html.chars().peekable();

    while let Some(ch) = chars.next() {
        if let Some(name) = entity.as_mut() {
            if ch == ';' {
                decode_entity(name, &mut result);
                entity = None;
                continue;
            }
            if (ch.is_ascii_alphanumeric() || ch == '#') && name.len() < MAX_ENTITY_LEN {
                name.push(ch);
                continue;
            }
            // Not an entity after all
            result.push('&');
            result.push_str(name);
            entity = None;
        }

        if let Some(text) = tag.as_mut() {
            if ch != '>' {
                text.push(ch);
                continue;
            }
            let (closing, name) = tag_name(text);
            match hidden {
                Some(element) if closing && name == element => hidden = None,
                Some(_) => {}
                None if !closing && !text.ends_with('/') => {
                    hidden = HIDDEN_ELEMENTS.iter().copied().find(|e| *e == name);
                }
                None => {}
            }
            tag = None;
            result.push(' ');
            continue;
        }

        match ch {
            // Inside a hidden element only a closing tag ends the skip.
            '<' if hidden.is_none() || chars.peek() == Some(&'/') => tag = Some(String::new()),
            _ if hidden.is_some() => {}
            '&' => entity = Some(String::new()),
            _ => result.push(ch),
        }
    }
    if let Some(name) = entity {
        result.push('&');
        result.push_str(&name);
    }

    collapse_whitespace(&result)
}

/// Lowercased element name of a tag body, and whether it is a closing tag.
fn tag_name(tag: &str) -> (bool, String) {
    let (closing, rest) = match tag.trim_start().strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, tag.trim_start()),
    };
    let name = rest
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    (closing, name)
}

fn decode_entity(name: &str, out: &mut String) {
    match name {
        "amp" => out.push('&'),
        "lt" => out.push('<'),
        "gt" => out.push('>'),
        "quot" => out.push('"'),
        "apos" => out.push('\''),
        "nbsp" => out.push(' '),
        _ => match parse_numeric_entity(name).and_then(char::from_u32) {
            Some(c) => out.push(c),
            None => {
                out.push('&');
                out.push_str(name);
                out.push(';');
            }
        },
    }
}

/// Parse a numeric HTML entity (e.g., "#123" or "#x7B").
fn parse_numeric_entity(entity: &str) -> Option<u32> {
    let digits = entity.strip_prefix('#')?;
    if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        digits.parse().ok()
    }
}

/// Truncate text to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
