//! Issue tracker access.
//!
//! The analysis engine only talks to the [`IssueTracker`] trait. Two
//! implementations ship with the crate:
//!
//! - [`github::GitHubTracker`]: the GitHub REST API over `ureq`
//! - [`memory::MemoryTracker`]: an in-process tracker for tests and
//!   `analyze --dry-run`

use anyhow::Result;

use crate::model::{IssueDraft, TrackingIssue};

pub mod github;
pub mod memory;

pub use github::GitHubTracker;
pub use memory::MemoryTracker;

/// A remote (or simulated) issue tracker.
pub trait IssueTracker {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// All open issues carrying every label in `labels`.
    fn fetch_open_issues(&self, labels: &[String]) -> Result<Vec<TrackingIssue>>;

    /// File a new issue and return its number.
    fn create_issue(&mut self, draft: &IssueDraft) -> Result<u64>;

    /// Append a comment to an existing issue.
    fn add_comment(&mut self, number: u64, body: &str) -> Result<()>;
}

/// Stands in when no real tracker could be built (no token, no repository).
/// Every call fails with the construction error, so the run still parses
/// and groups failures and reports each group as failed.
#[derive(Debug)]
pub struct UnavailableTracker {
    reason: String,
}

impl UnavailableTracker {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl IssueTracker for UnavailableTracker {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn fetch_open_issues(&self, _labels: &[String]) -> Result<Vec<TrackingIssue>> {
        anyhow::bail!("issue tracker unavailable: {}", self.reason)
    }

    fn create_issue(&mut self, _draft: &IssueDraft) -> Result<u64> {
        anyhow::bail!("issue tracker unavailable: {}", self.reason)
    }

    fn add_comment(&mut self, _number: u64, _body: &str) -> Result<()> {
        anyhow::bail!("issue tracker unavailable: {}", self.reason)
    }
}
