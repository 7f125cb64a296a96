//! In-memory tracker.
//!
//! Holds issues in a `Vec`, records every create and comment call, and can
//! be told to fail individual operations. `analyze --dry-run` seeds one
//! with the real open issues so the run can be previewed without writing.

use std::cell::Cell;

use anyhow::Result;

use super::IssueTracker;
use crate::model::{IssueDraft, IssueState, TrackingIssue};

/// A comment recorded by [`MemoryTracker::add_comment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedComment {
    pub issue: u64,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct MemoryTracker {
    issues: Vec<TrackingIssue>,
    created: Vec<(u64, IssueDraft)>,
    comments: Vec<RecordedComment>,
    fetch_calls: Cell<usize>,
    fail_fetch: bool,
    fail_create: bool,
    fail_comment: bool,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `issues` already on the tracker.
    pub fn with_issues(issues: Vec<TrackingIssue>) -> Self {
        Self {
            issues,
            ..Self::default()
        }
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_comment(mut self) -> Self {
        self.fail_comment = true;
        self
    }

    /// Every issue, including ones created during the run.
    pub fn issues(&self) -> &[TrackingIssue] {
        &self.issues
    }

    /// Drafts passed to `create_issue`, with the number each was given.
    pub fn created(&self) -> &[(u64, IssueDraft)] {
        &self.created
    }

    pub fn comments(&self) -> &[RecordedComment] {
        &self.comments
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }

    fn next_number(&self) -> u64 {
        self.issues.iter().map(|i| i.number).max().unwrap_or(0) + 1
    }
}

impl IssueTracker for MemoryTracker {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn fetch_open_issues(&self, _labels: &[String]) -> Result<Vec<TrackingIssue>> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);
        if self.fail_fetch {
            anyhow::bail!("simulated failure listing issues");
        }
        Ok(self
            .issues
            .iter()
            .filter(|i| i.state == IssueState::Open)
            .cloned()
            .collect())
    }

    fn create_issue(&mut self, draft: &IssueDraft) -> Result<u64> {
        if self.fail_create {
            anyhow::bail!("simulated failure creating issue");
        }
        let number = self.next_number();
        self.issues.push(TrackingIssue {
            number,
            title: draft.title.clone(),
            body: draft.body.clone(),
            state: IssueState::Open,
        });
        self.created.push((number, draft.clone()));
        Ok(number)
    }

    fn add_comment(&mut self, number: u64, body: &str) -> Result<()> {
        if self.fail_comment {
            anyhow::bail!("simulated failure commenting on #{number}");
        }
        if !self.issues.iter().any(|i| i.number == number) {
            anyhow::bail!("issue #{number} not found");
        }
        self.comments.push(RecordedComment {
            issue: number,
            body: body.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
