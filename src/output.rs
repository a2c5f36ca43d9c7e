//! Output normalisation and document writing.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{dedupe_sort_cap, AggregateResult, LostFriend};
use crate::config::{Config, OutputConfig};
use crate::feed::truncate_chars;
use crate::Result;

/// Applies the final hard caps to an aggregate before it is written.
#[derive(Debug, Clone, Copy)]
pub struct OutputNormalizer {
    summary_max_chars: usize,
    max_articles: usize,
}

impl OutputNormalizer {
    pub fn new(summary_max_chars: usize, max_articles: usize) -> Self {
        Self {
            summary_max_chars,
            max_articles,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.output.summary_max_chars, config.spider.max_articles)
    }

    /// Truncate oversized summaries, re-sort, drop the oldest excess
    /// articles and recompute the counts. Returns the number of summaries
    /// that were truncated.
    pub fn normalize(&self, result: &mut AggregateResult) -> usize {
        let mut truncated = 0;
        for article in &mut result.article_data {
            if article.summary.chars().count() > self.summary_max_chars {
                article.summary = truncate_chars(&article.summary, self.summary_max_chars);
                truncated += 1;
            }
        }

        let articles = std::mem::take(&mut result.article_data);
        result.article_data = dedupe_sort_cap(articles, self.max_articles);
        result.recount();

        debug!(
            truncated,
            articles = result.article_count,
            friends = result.friend_count,
            "Normalised output"
        );
        truncated
    }
}

/// Serialise `value` as pretty JSON and replace `path` atomically.
///
/// The document is written to a sibling temp file first and then renamed,
/// so readers never observe a partial file. Parent directories are created.
pub fn write_json<P: AsRef<Path>, T: Serialize + ?Sized>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `all.json` and `errors.json` into the output directory.
pub fn write_documents(
    config: &OutputConfig,
    result: &AggregateResult,
    lost: &[LostFriend],
) -> Result<()> {
    let dir = Path::new(&config.dir);
    let all_path = dir.join(&config.all_file);
    let errors_path = dir.join(&config.errors_file);

    write_json(&all_path, result)?;
    write_json(&errors_path, lost)?;

    info!(
        all = %all_path.display(),
        errors = %errors_path.display(),
        articles = result.article_count,
        lost = lost.len(),
        "Wrote output documents"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Article, FailureReason};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn article(n: u32, summary: &str) -> Article {
        Article {
            title: format!("Post {n}"),
            link: format!("https://a.example/{n}"),
            published: Utc.with_ymd_and_hms(2025, 1, n, 0, 0, 0).unwrap(),
            summary: summary.to_string(),
            author: String::new(),
            source: if n % 2 == 0 { "Even" } else { "Odd" }.to_string(),
            avatar: String::new(),
        }
    }

    fn result(articles: Vec<Article>) -> AggregateResult {
        AggregateResult {
            article_count: articles.len(),
            friend_count: 0,
            article_data: articles,
            last_updated: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_normalize_truncates_summaries() {
        let mut doc = result(vec![article(1, &"é".repeat(50)), article(2, "short")]);

        let truncated = OutputNormalizer::new(10, 100).normalize(&mut doc);

        assert_eq!(truncated, 1);
        let long = doc.article_data.iter().find(|a| a.title == "Post 1").unwrap();
        assert_eq!(long.summary.chars().count(), 10);
        let short = doc.article_data.iter().find(|a| a.title == "Post 2").unwrap();
        assert_eq!(short.summary, "short");
    }

    #[test]
    fn test_normalize_caps_and_recounts() {
        let mut doc = result((1..=6).map(|n| article(n, "")).collect());

        OutputNormalizer::new(300, 3).normalize(&mut doc);

        let titles: Vec<&str> = doc.article_data.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Post 6", "Post 5", "Post 4"]);
        assert_eq!(doc.article_count, 3);
        assert_eq!(doc.friend_count, 2);
    }

    #[test]
    fn test_write_json_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("all.json");

        write_json(&path, &result(vec![article(1, "s")])).unwrap();
        write_json(&path, &result(vec![article(2, "s")])).unwrap();

        let written: AggregateResult =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.article_data[0].title, "Post 2");
        assert!(!dir.path().join("out").join("all.json.tmp").exists());
    }

    #[test]
    fn test_write_documents() {
        let dir = TempDir::new().unwrap();
        let config = OutputConfig {
            dir: dir.path().to_string_lossy().into_owned(),
            ..OutputConfig::default()
        };
        let lost = vec![LostFriend {
            name: "Gone".to_string(),
            link: "https://gone.example".to_string(),
            avatar: String::new(),
            reason: FailureReason::Unreachable,
            backfilled: false,
        }];

        write_documents(&config, &result(Vec::new()), &lost).unwrap();

        let errors: Vec<LostFriend> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("errors.json")).unwrap()).unwrap();
        assert_eq!(errors, lost);
        assert!(dir.path().join("all.json").exists());
    }
}
