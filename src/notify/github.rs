//! Subscribers recorded as closed GitHub issues.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::SubscriberSource;
use crate::config::SubscribeConfig;
use crate::{FriendCircleError, Result};

const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("friend-circle/", env!("CARGO_PKG_VERSION"));
const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";

#[derive(Debug, Deserialize)]
struct Issue {
    #[serde(default)]
    body: Option<String>,
}

/// Reads subscriber addresses from the bodies of labelled, closed issues.
pub struct GitHubIssues {
    client: Client,
    issues_url: Url,
    token: Option<String>,
    email_pattern: Regex,
}

impl GitHubIssues {
    /// Query the public GitHub API.
    pub fn new(config: &SubscribeConfig) -> Result<Self> {
        Self::with_api_base(config, GITHUB_API)
    }

    /// Query a GitHub-compatible API at `api_base`.
    pub fn with_api_base(config: &SubscribeConfig, api_base: &str) -> Result<Self> {
        let repo = config.github_repo.trim().trim_matches('/');
        if repo.is_empty() {
            return Err(FriendCircleError::Config(
                "subscribe.github_repo is not set".to_string(),
            ));
        }

        let issues_url = Url::parse_with_params(
            &format!("{}/repos/{repo}/issues", api_base.trim_end_matches('/')),
            &[
                ("state", "closed"),
                ("labels", config.issue_label.as_str()),
                ("per_page", "200"),
            ],
        )
        .map_err(|e| FriendCircleError::Config(format!("invalid issues URL: {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FriendCircleError::Http(format!("failed to create HTTP client: {e}")))?;

        let email_pattern = Regex::new(EMAIL_PATTERN)
            .map_err(|e| FriendCircleError::Config(format!("invalid e-mail pattern: {e}")))?;

        Ok(Self {
            client,
            issues_url,
            token: config.github_token.clone(),
            email_pattern,
        })
    }

    /// The issues query this source runs.
    pub fn issues_url(&self) -> &str {
        self.issues_url.as_str()
    }
}

#[async_trait]
impl SubscriberSource for GitHubIssues {
    async fn subscribers(&self) -> Result<Vec<String>> {
        debug!(url = %self.issues_url, "Fetching subscriber issues");

        let mut request = self
            .client
            .get(self.issues_url.clone())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FriendCircleError::Http(format!(
                "{}: HTTP {status}",
                self.issues_url
            )));
        }

        let issues: Vec<Issue> = response.json().await?;
        let emails = extract_emails(
            &self.email_pattern,
            issues.iter().filter_map(|i| i.body.as_deref()),
        );
        info!(issues = issues.len(), subscribers = emails.len(), "Loaded subscribers");
        Ok(emails)
    }
}

/// Every address found in `texts`, in first-seen order, without repeats.
fn extract_emails<'a>(pattern: &Regex, texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .flat_map(|text| pattern.find_iter(text))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|email| seen.insert(email.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SubscribeConfig {
        SubscribeConfig {
            github_repo: "alice/blog".to_string(),
            github_token: Some("secret".to_string()),
            ..SubscribeConfig::default()
        }
    }

    #[test]
    fn test_extract_emails_dedupes_in_order() {
        let pattern = Regex::new(EMAIL_PATTERN).unwrap();
        let bodies = [
            "Please subscribe bob@example.com.",
            "carol@mail.example.org and BOB@example.com",
            "no address here",
        ];

        let emails = extract_emails(&pattern, bodies);
        assert_eq!(emails, vec!["bob@example.com", "carol@mail.example.org"]);
    }

    #[test]
    fn test_issues_url() {
        let source = GitHubIssues::new(&config()).unwrap();
        assert_eq!(
            source.issues_url(),
            "https://api.github.com/repos/alice/blog/issues?state=closed&labels=subscribed&per_page=200"
        );
    }

    #[test]
    fn test_missing_repo_is_config_error() {
        let config = SubscribeConfig {
            github_repo: String::new(),
            ..SubscribeConfig::default()
        };
        assert!(matches!(
            GitHubIssues::new(&config),
            Err(FriendCircleError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribers_from_api() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/alice/blog/issues")
            .match_query(mockito::Matcher::Any)
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"body": "me@reader.example"}, {"body": null}, {"title": "x"}]"#)
            .create_async()
            .await;

        let source = GitHubIssues::with_api_base(&config(), &server.url()).unwrap();
        let emails = source.subscribers().await.unwrap();
        assert_eq!(emails, vec!["me@reader.example"]);
    }

    #[tokio::test]
    async fn test_subscribers_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/alice/blog/issues")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let source = GitHubIssues::with_api_base(&config(), &server.url()).unwrap();
        assert!(matches!(
            source.subscribers().await,
            Err(FriendCircleError::Http(_))
        ));
    }
}
