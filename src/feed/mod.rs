//! Feed fetching module for friend-circle.
//!
//! Fetches one feed URL and turns the document into normalised entries,
//! classifying failures as unreachable / timeout / parse-error.

pub mod fetcher;
pub mod parser;
pub mod types;

pub use fetcher::{validate_url, FeedFetcher};
pub use parser::{parse_feed, strip_html, truncate_chars, ExtractionStrategy};
pub use types::{
    identity_key, Article, FailureReason, FeedEntry, FetchError, FetchedFeed, MAX_SUMMARY_CHARS,
    UNTITLED,
};
