//! GitHub REST API tracker.
//!
//! Uses the synchronous `ureq` agent. Requests carry a bearer token, the
//! GitHub JSON media type and a `User-Agent`. Transport errors, `429` and
//! `5xx` responses are retried with exponential backoff plus jitter; every
//! other non-success status fails immediately with the status code and the
//! start of the response body.
//!
//! The token never appears in `Debug` output, logs or error messages.

use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::IssueTracker;
use crate::config::schema::TrackerConfig;
use crate::model::{IssueDraft, IssueState, TrackingIssue};
use crate::utils::text::truncate_chars;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("failtrack/", env!("CARGO_PKG_VERSION"));

/// Page size requested when listing issues (the API maximum).
const PER_PAGE: usize = 100;

/// Characters of an error response body kept in error messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// API payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: String,
    /// Present only on pull requests, which share the issues endpoint.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl ApiIssue {
    fn into_tracking_issue(self) -> TrackingIssue {
        TrackingIssue {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            state: if self.state.eq_ignore_ascii_case("closed") {
                IssueState::Closed
            } else {
                IssueState::Open
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    number: u64,
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// API token. Only [`Token::expose`] reveals the value.
#[derive(Clone)]
struct Token(String);

impl Token {
    fn expose(&self) -> &str {
        &self.0
    }

    /// Replace any occurrence of the token in `text`.
    fn redact(&self, text: &str) -> String {
        if self.0.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.0, "***")
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Synchronous GitHub issues client for one repository.
pub struct GitHubTracker {
    agent: ureq::Agent,
    api_url: String,
    owner: String,
    repo: String,
    token: Token,
    max_retries: u32,
    retry_base: Duration,
    max_pages: u32,
}

impl fmt::Debug for GitHubTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubTracker")
            .field("api_url", &self.api_url)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &self.token)
            .field("max_retries", &self.max_retries)
            .field("retry_base", &self.retry_base)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl GitHubTracker {
    /// Build a client from the resolved config, reading the token from the
    /// environment variable named by `tracker.token_env`.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .with_context(|| format!("environment variable {} is not set", config.token_env))?;
        Self::new(config, token)
    }

    /// Build a client with an explicit token.
    pub fn new(config: &TrackerConfig, token: impl Into<String>) -> Result<Self> {
        if config.repository().is_none() {
            anyhow::bail!(
                "no repository configured; set tracker.owner and tracker.repo or FAILTRACK_REPOSITORY"
            );
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build();

        Ok(Self {
            agent,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.trim().to_string(),
            repo: config.repo.trim().to_string(),
            token: Token(token.into()),
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
            max_pages: config.max_pages.max(1),
        })
    }

    /// `owner/repo`.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.owner, self.repo)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &format!("Bearer {}", self.token.expose()))
            .set("Accept", ACCEPT)
            .set("X-GitHub-Api-Version", API_VERSION)
    }

    /// Check that the token can read the repository.
    pub fn check_access(&self) -> Result<()> {
        let request = self.request("GET", &self.repo_url());
        self.send(request, None, "repository lookup")?;
        Ok(())
    }

    /// Send `request`, retrying transient failures.
    ///
    /// Returns the response for any 2xx/3xx status. `what` names the call in
    /// logs and errors.
    fn send(
        &self,
        request: ureq::Request,
        body: Option<&serde_json::Value>,
        what: &str,
    ) -> Result<ureq::Response> {
        let mut attempt = 0;
        loop {
            let result = match body {
                Some(payload) => request.clone().send_json(payload),
                None => request.clone().call(),
            };

            let retryable = match result {
                Ok(response) => return Ok(response),
                Err(ureq::Error::Status(code, response)) => {
                    if !is_retryable_status(code) || attempt >= self.max_retries {
                        return Err(self.status_error(what, code, response));
                    }
                    format!("HTTP {code}")
                }
                Err(ureq::Error::Transport(transport)) => {
                    let message = self.token.redact(&transport.to_string());
                    if attempt >= self.max_retries {
                        anyhow::bail!("GitHub {what} failed: {message}");
                    }
                    message
                }
            };

            let delay = backoff_delay(self.retry_base, attempt, jitter_entropy());
            warn!(
                call = what,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                reason = %retryable,
                "retrying GitHub request"
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    fn status_error(&self, what: &str, code: u16, response: ureq::Response) -> anyhow::Error {
        let text = response.into_string().unwrap_or_default();
        let excerpt = self.token.redact(truncate_chars(text.trim(), MAX_ERROR_BODY_CHARS));
        anyhow::anyhow!("GitHub {what} returned HTTP {code}: {excerpt}")
    }

    /// Fail unless the response has exactly `expected` status.
    fn expect_status(&self, what: &str, expected: u16, response: ureq::Response) -> Result<ureq::Response> {
        let code = response.status();
        if code == expected {
            Ok(response)
        } else {
            Err(self.status_error(what, code, response))
        }
    }
}

impl IssueTracker for GitHubTracker {
    fn name(&self) -> &'static str {
        "github"
    }

    fn fetch_open_issues(&self, labels: &[String]) -> Result<Vec<TrackingIssue>> {
        let url = format!("{}/issues", self.repo_url());
        let label_filter = labels.join(",");
        let mut issues = Vec::new();

        for page in 1..=self.max_pages {
            let mut request = self
                .request("GET", &url)
                .query("state", "open")
                .query("per_page", &PER_PAGE.to_string())
                .query("page", &page.to_string());
            if !label_filter.is_empty() {
                request = request.query("labels", &label_filter);
            }

            let response = self.send(request, None, "issue listing")?;
            let items: Vec<ApiIssue> = response
                .into_json()
                .context("failed to parse GitHub issue listing")?;
            let count = items.len();
            debug!(page, count, "fetched issue page");

            issues.extend(
                items
                    .into_iter()
                    .filter(|item| item.pull_request.is_none())
                    .map(ApiIssue::into_tracking_issue),
            );

            if count < PER_PAGE {
                break;
            }
            if page == self.max_pages {
                warn!(max_pages = self.max_pages, "stopped listing issues at page limit");
            }
        }

        info!(repository = %self.repository(), open_issues = issues.len(), "fetched open issues");
        Ok(issues)
    }

    fn create_issue(&mut self, draft: &IssueDraft) -> Result<u64> {
        let url = format!("{}/issues", self.repo_url());
        let payload = json!({
            "title": draft.title,
            "body": draft.body,
            "labels": draft.labels,
        });

        let response = self.send(self.request("POST", &url), Some(&payload), "issue creation")?;
        let response = self.expect_status("issue creation", 201, response)?;
        let created: CreatedIssue = response
            .into_json()
            .context("failed to parse GitHub issue creation response")?;
        Ok(created.number)
    }

    fn add_comment(&mut self, number: u64, body: &str) -> Result<()> {
        let url = format!("{}/issues/{number}/comments", self.repo_url());
        let payload = json!({ "body": body });

        let response = self.send(self.request("POST", &url), Some(&payload), "comment creation")?;
        self.expect_status("comment creation", 201, response)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

fn is_retryable_status(code: u16) -> bool {
    code == 429 || (500..=599).contains(&code)
}

/// `base * 2^attempt` plus up to 50% jitter taken from `entropy`.
fn backoff_delay(base: Duration, attempt: u32, entropy: u64) -> Duration {
    let base_ms = base.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter_span = exp_ms / 2;
    let jitter_ms = if jitter_span == 0 { 0 } else { entropy % (jitter_span + 1) };
    Duration::from_millis(exp_ms.saturating_add(jitter_ms))
}

fn jitter_entropy() -> u64 {
    u64::from(Utc::now().timestamp_subsec_nanos())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
