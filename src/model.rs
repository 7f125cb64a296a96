//! Core data types shared by the parser, grouper, generator and matcher.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::signature;

// ---------------------------------------------------------------------------
// Failure records
// ---------------------------------------------------------------------------

/// Terminal status of a failing test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStatus {
    /// The test ran and an assertion failed.
    Failed,
    /// The test could not complete (setup error, crash, infrastructure).
    Broken,
}

impl std::fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed => write!(f, "failed"),
            Self::Broken => write!(f, "broken"),
        }
    }
}

/// One failing test, as produced by a source reader.
///
/// The error signature is computed at construction time and the record
/// cannot be modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    test_name: String,
    file_or_package: String,
    error_message: String,
    error_signature: String,
    status: FailureStatus,
    framework: Option<String>,
    duration_ms: Option<u64>,
}

impl FailureRecord {
    pub fn new(
        test_name: impl Into<String>,
        file_or_package: impl Into<String>,
        error_message: impl Into<String>,
        status: FailureStatus,
    ) -> Self {
        let error_message = error_message.into();
        let error_signature = signature::extract(&error_message);
        Self {
            test_name: test_name.into(),
            file_or_package: file_or_package.into(),
            error_message,
            error_signature,
            status,
            framework: None,
            duration_ms: None,
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn file_or_package(&self) -> &str {
        &self.file_or_package
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn error_signature(&self) -> &str {
        &self.error_signature
    }

    pub fn status(&self) -> FailureStatus {
        self.status
    }

    pub fn framework(&self) -> Option<&str> {
        self.framework.as_deref()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// All failures of one run that share an error signature.
///
/// Only the grouper builds these, and never with an empty record list.
#[derive(Debug, Clone)]
pub struct FailureGroup {
    signature: String,
    representative_message: String,
    records: Vec<FailureRecord>,
    framework: Option<String>,
    status: FailureStatus,
}

impl FailureGroup {
    pub(crate) fn from_first(record: FailureRecord) -> Self {
        Self {
            signature: record.error_signature().to_string(),
            representative_message: record.error_message().to_string(),
            framework: record.framework().map(str::to_string),
            status: record.status(),
            records: vec![record],
        }
    }

    pub(crate) fn push(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn representative_message(&self) -> &str {
        &self.representative_message
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the group holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn framework(&self) -> Option<&str> {
        self.framework.as_deref()
    }

    pub fn status(&self) -> FailureStatus {
        self.status
    }

    /// Distinct files or packages touched by this group, sorted.
    pub fn affected_files(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(FailureRecord::file_or_package)
            .filter(|f| !f.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct test names in first-seen order.
    pub fn affected_tests(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.records
            .iter()
            .map(FailureRecord::test_name)
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tracker-side entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// An issue as it exists on the remote tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: IssueState,
}

/// An issue payload that has not been submitted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueDraft {
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Build context
// ---------------------------------------------------------------------------

/// Information about the CI build being analyzed.
///
/// Built once at the edge (CLI flags, then Jenkins-style environment
/// variables) and passed down explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildContext {
    pub branch: Option<String>,
    pub build_number: Option<String>,
    pub build_url: Option<String>,
    pub job_name: Option<String>,
    /// Checkout root, stripped from absolute file paths in reports.
    pub workspace: Option<PathBuf>,
}

impl BuildContext {
    /// Read the standard Jenkins build variables.
    pub fn from_env() -> Self {
        Self {
            branch: env_non_empty("BRANCH_NAME").or_else(|| env_non_empty("GIT_BRANCH")),
            build_number: env_non_empty("BUILD_NUMBER"),
            build_url: env_non_empty("BUILD_URL"),
            job_name: env_non_empty("JOB_NAME"),
            workspace: env_non_empty("WORKSPACE").map(PathBuf::from),
        }
    }

    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: BuildContext) -> Self {
        Self {
            branch: self.branch.or(fallback.branch),
            build_number: self.build_number.or(fallback.build_number),
            build_url: self.build_url.or(fallback.build_url),
            job_name: self.job_name.or(fallback.job_name),
            workspace: self.workspace.or(fallback.workspace),
        }
    }

    /// Make `path` relative to the workspace when it lives inside it.
    pub fn relative_path(&self, path: &str) -> String {
        if let Some(root) = &self.workspace
            && let Ok(rel) = std::path::Path::new(path).strip_prefix(root)
        {
            return rel.to_string_lossy().replace('\\', "/");
        }
        path.to_string()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_derives_signature_on_construction() {
        let record = FailureRecord::new(
            "loads config",
            "src/config.test.js",
            "Cannot find module 'left-pad'",
            FailureStatus::Failed,
        );
        assert_eq!(record.error_signature(), "missing_module:left-pad");
        assert!(record.framework().is_none());
    }

    #[test]
    fn group_carries_first_record_metadata() {
        let first = FailureRecord::new("a", "x.js", "boom", FailureStatus::Broken)
            .with_framework("jest");
        let mut group = FailureGroup::from_first(first);
        group.push(FailureRecord::new("b", "y.js", "boom", FailureStatus::Failed));

        assert_eq!(group.len(), 2);
        assert!(!group.is_empty());
        assert_eq!(group.framework(), Some("jest"));
        assert_eq!(group.status(), FailureStatus::Broken);
        assert_eq!(group.representative_message(), "boom");
    }

    #[test]
    fn affected_files_are_sorted_and_unique() {
        let mut group =
            FailureGroup::from_first(FailureRecord::new("t1", "b.js", "e", FailureStatus::Failed));
        group.push(FailureRecord::new("t2", "a.js", "e", FailureStatus::Failed));
        group.push(FailureRecord::new("t3", "b.js", "e", FailureStatus::Failed));
        group.push(FailureRecord::new("t1", "", "e", FailureStatus::Failed));

        assert_eq!(group.affected_files(), vec!["a.js", "b.js"]);
        assert_eq!(group.affected_tests(), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn relative_path_strips_workspace_prefix() {
        let ctx = BuildContext {
            workspace: Some(PathBuf::from("/var/jenkins/ws")),
            ..Default::default()
        };
        assert_eq!(
            ctx.relative_path("/var/jenkins/ws/src/app.test.js"),
            "src/app.test.js"
        );
        assert_eq!(ctx.relative_path("/other/app.test.js"), "/other/app.test.js");
    }

    #[test]
    fn build_context_or_prefers_explicit_values() {
        let explicit = BuildContext {
            branch: Some("feature/x".to_string()),
            ..Default::default()
        };
        let fallback = BuildContext {
            branch: Some("main".to_string()),
            build_number: Some("42".to_string()),
            ..Default::default()
        };
        let merged = explicit.or(fallback);
        assert_eq!(merged.branch.as_deref(), Some("feature/x"));
        assert_eq!(merged.build_number.as_deref(), Some("42"));
    }
}
