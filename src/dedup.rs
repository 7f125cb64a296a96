//! Duplicate detection: decide whether a failure group already has an
//! open tracking issue.
//!
//! Rules are tried in order against every open issue; the first hit wins:
//!
//! 1. the issue body carries the group's ``Error Signature: `...` `` line
//! 2. the titles are equal once the `(N tests)` count suffix is removed
//! 3. for `missing_module:<name>`, the title names the module and says
//!    "Missing module"
//!
//! Closed issues never match, so a regression after a fix files a new issue.

use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::issue::signature_line;
use crate::model::{IssueState, TrackingIssue};

static COUNT_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d+ tests?\)\s*$").expect("count suffix regex must compile"));

/// Which rule matched an existing issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    Signature,
    Title,
    MissingModule,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signature => write!(f, "signature"),
            Self::Title => write!(f, "title"),
            Self::MissingModule => write!(f, "missing-module"),
        }
    }
}

/// Remove a trailing `(N test)` / `(N tests)` count.
pub fn strip_count_suffix(title: &str) -> Cow<'_, str> {
    COUNT_SUFFIX_RE.replace(title, "")
}

/// Find an open issue that already tracks this failure.
pub fn find_match<'a>(
    open_issues: &'a [TrackingIssue],
    signature: &str,
    title: &str,
) -> Option<&'a TrackingIssue> {
    find_match_with_reason(open_issues, signature, title).map(|(issue, _)| issue)
}

/// Like [`find_match`], also reporting which rule matched.
pub fn find_match_with_reason<'a>(
    open_issues: &'a [TrackingIssue],
    signature: &str,
    title: &str,
) -> Option<(&'a TrackingIssue, MatchReason)> {
    let open = move || open_issues.iter().filter(|i| i.state == IssueState::Open);

    let marker = signature_line(signature);
    if let Some(issue) = open().find(|i| i.body.contains(&marker)) {
        return Some((issue, MatchReason::Signature));
    }

    let wanted = strip_count_suffix(title);
    if let Some(issue) = open().find(|i| strip_count_suffix(&i.title) == wanted) {
        return Some((issue, MatchReason::Title));
    }

    if let Some(module) = signature.strip_prefix("missing_module:")
        && !module.is_empty()
        && let Some(issue) = open().find(|i| i.title.contains("Missing module") && i.title.contains(module))
    {
        return Some((issue, MatchReason::MissingModule));
    }

    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
