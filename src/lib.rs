//! friend-circle - friend circle feed aggregator
//!
//! Collects the latest posts from a list of friends' blogs (RSS, Atom or
//! JSON Feed), merges them into one newest-first document, and optionally
//! mails subscribers when the owning blog publishes something new.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod datetime;
pub mod error;
pub mod feed;
pub mod friends;
pub mod logging;
pub mod merge;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod template;

pub use aggregate::{AggregateResult, AggregateSettings, Aggregation, Aggregator, LostFriend};
pub use cache::FeedCache;
pub use config::Config;
pub use error::{FriendCircleError, Result};
pub use feed::{Article, FailureReason, FeedFetcher, FetchError};
pub use friends::{Friend, FriendResolver};
pub use merge::RemoteMerger;
pub use notify::{NotifyOutcome, SubscriberNotifier};
pub use output::OutputNormalizer;
