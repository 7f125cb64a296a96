//! Reader for Jest-style JSON reports (`jest --json --outputFile=...`).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

use super::SourceReader;
use crate::model::{BuildContext, FailureRecord, FailureStatus};
use crate::utils::text::strip_ansi;

/// Test name used for suite-level failures: the file never ran, or a hook
/// outside any single test failed.
pub const SUITE_FAILURE_NAME: &str = "Test suite failed to run";

// ---------------------------------------------------------------------------
// Report schema (only the fields we read)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestReport {
    #[serde(default)]
    test_results: Vec<FileResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResult {
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    assertion_results: Vec<AssertionResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssertionResult {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    ancestor_titles: Vec<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    failure_messages: Vec<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl AssertionResult {
    fn display_name(&self) -> String {
        match self.full_name.as_deref().map(str::trim) {
            Some(full) if !full.is_empty() => full.to_string(),
            _ => {
                let mut parts: Vec<&str> = self.ancestor_titles.iter().map(String::as_str).collect();
                parts.push(&self.title);
                parts.join(" › ")
            }
        }
    }

    fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct JestReportReader {
    path: PathBuf,
}

impl JestReportReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SourceReader for JestReportReader {
    fn name(&self) -> &'static str {
        "jest"
    }

    fn read(&self, ctx: &BuildContext) -> Result<Vec<FailureRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "test report not readable");
                return Ok(Vec::new());
            }
        };
        Ok(parse_report(&content, ctx))
    }
}

/// Parse a report document. Malformed JSON yields no records.
pub fn parse_report(content: &str, ctx: &BuildContext) -> Vec<FailureRecord> {
    let report: JestReport = match serde_json::from_str(content) {
        Ok(report) => report,
        Err(error) => {
            warn!(%error, "malformed JSON test report; no failures extracted");
            return Vec::new();
        }
    };

    let mut records = Vec::new();
    for file in &report.test_results {
        let path = ctx.relative_path(&file.name);
        let failed: Vec<&AssertionResult> =
            file.assertion_results.iter().filter(|a| a.is_failed()).collect();

        if file.status == "failed"
            && let Some(message) = file.message.as_deref().filter(|m| !m.trim().is_empty())
            && !repeats_assertions(message, &failed)
        {
            records.push(
                FailureRecord::new(SUITE_FAILURE_NAME, &path, message, FailureStatus::Broken)
                    .with_framework("jest"),
            );
        }

        for assertion in failed {
            let message = assertion.failure_messages.join("\n");
            let duration = assertion
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| d.round() as u64);
            records.push(
                FailureRecord::new(assertion.display_name(), &path, message, FailureStatus::Failed)
                    .with_framework("jest")
                    .with_duration_ms(duration),
            );
        }
    }

    records
}

/// Whether a suite message is nothing but Jest's rendering of the failed
/// assertions: every non-blank line is either a `● <test name>` header or a
/// line of some assertion's failure messages.
fn repeats_assertions(message: &str, failed: &[&AssertionResult]) -> bool {
    if failed.is_empty() {
        return false;
    }
    let headers: HashSet<String> = failed
        .iter()
        .map(|a| format!("● {}", a.display_name()))
        .collect();
    let detail: Vec<String> = failed
        .iter()
        .flat_map(|a| a.failure_messages.iter())
        .map(|m| strip_ansi(m).into_owned())
        .collect();
    let known: HashSet<&str> = detail
        .iter()
        .flat_map(|m| m.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    strip_ansi(message)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .all(|l| known.contains(l) || headers.contains(l))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
