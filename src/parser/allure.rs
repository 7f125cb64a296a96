//! Reader for a directory of normalized per-test result files.
//!
//! Every `*-result.json` file describes one test:
//!
//! ```json
//! {
//!   "name": "logs in",
//!   "status": "failed",
//!   "statusDetails": { "message": "...", "trace": "..." },
//!   "labels": [{ "name": "package", "value": "auth.login" }],
//!   "start": 1700000000000,
//!   "stop": 1700000001500
//! }
//! ```
//!
//! Files are parsed independently; one bad file is logged and skipped.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use super::SourceReader;
use crate::model::{BuildContext, FailureRecord, FailureStatus};

const RESULT_FILE_SUFFIX: &str = "-result.json";

/// Labels consulted for `file_or_package`, most specific first.
const LOCATION_LABELS: &[&str] = &["package", "testClass", "suite", "parentSuite"];

// ---------------------------------------------------------------------------
// Result file schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_details: Option<StatusDetails>,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    stop: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusDetails {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
    #[serde(default)]
    value: String,
}

impl ResultFile {
    fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name && !l.value.trim().is_empty())
            .map(|l| l.value.as_str())
    }

    fn failure_status(&self) -> Option<FailureStatus> {
        match self.status.as_deref()? {
            "failed" => Some(FailureStatus::Failed),
            "broken" => Some(FailureStatus::Broken),
            _ => None,
        }
    }

    fn location(&self) -> String {
        LOCATION_LABELS
            .iter()
            .find_map(|name| self.label(name))
            .or(self.full_name.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    /// The status message, or the trace when the message is empty.
    fn message(&self) -> String {
        let Some(details) = &self.status_details else {
            return String::new();
        };
        let message = details.message.as_deref().unwrap_or_default();
        if !message.trim().is_empty() {
            return message.to_string();
        }
        details.trace.clone().unwrap_or_default()
    }

    fn duration_ms(&self) -> Option<u64> {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) if stop >= start => Some(stop - start),
            _ => None,
        }
    }

    fn into_record(self, ctx: &BuildContext) -> Option<FailureRecord> {
        let status = self.failure_status()?;
        let framework = self.label("framework").or_else(|| self.label("language"));
        let mut record = FailureRecord::new(
            &self.name,
            ctx.relative_path(&self.location()),
            self.message(),
            status,
        )
        .with_duration_ms(self.duration_ms());
        if let Some(framework) = framework {
            record = record.with_framework(framework);
        }
        Some(record)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct AllureResultsReader {
    dir: PathBuf,
}

impl AllureResultsReader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Result files in the directory, sorted by file name.
    fn result_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list results directory {}", self.dir.display()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(RESULT_FILE_SUFFIX))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl SourceReader for AllureResultsReader {
    fn name(&self) -> &'static str {
        "allure"
    }

    fn read(&self, ctx: &BuildContext) -> Result<Vec<FailureRecord>> {
        let files = self.result_files()?;
        debug!(dir = %self.dir.display(), files = files.len(), "scanning result files");

        let mut records = Vec::new();
        for path in files {
            match parse_result_file(&path) {
                Ok(result) => records.extend(result.into_record(ctx)),
                Err(error) => {
                    warn!(path = %path.display(), error = %format!("{error:#}"), "skipping unreadable result file");
                }
            }
        }
        Ok(records)
    }
}

fn parse_result_file(path: &Path) -> Result<ResultFile> {
    let content = fs::read_to_string(path).context("failed to read result file")?;
    serde_json::from_str(&content).context("failed to parse result file")
}

/// Parse one result document. Returns `None` for passing, skipped or
/// malformed results.
pub fn parse_result(content: &str, ctx: &BuildContext) -> Option<FailureRecord> {
    serde_json::from_str::<ResultFile>(content)
        .ok()?
        .into_record(ctx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_becomes_record() {
        let json = r#"{
            "name": "logs in",
            "fullName": "auth.LoginTest.logs in",
            "status": "failed",
            "statusDetails": { "message": "Timeout of 2000ms exceeded", "trace": "at x" },
            "labels": [
                { "name": "suite", "value": "Login" },
                { "name": "package", "value": "auth.login" },
                { "name": "framework", "value": "mocha" }
            ],
            "start": 1000,
            "stop": 3500
        }"#;
        let record = parse_result(json, &BuildContext::default()).unwrap();
        assert_eq!(record.test_name(), "logs in");
        assert_eq!(record.file_or_package(), "auth.login");
        assert_eq!(record.error_signature(), "timeout_error");
        assert_eq!(record.framework(), Some("mocha"));
        assert_eq!(record.duration_ms(), Some(2500));
        assert_eq!(record.status(), FailureStatus::Failed);
    }

    #[test]
    fn broken_result_falls_back_to_trace() {
        let json = r#"{
            "name": "setup",
            "status": "broken",
            "statusDetails": { "message": "", "trace": "Error: connect ECONNREFUSED 127.0.0.1:5432" },
            "labels": [{ "name": "language", "value": "javascript" }]
        }"#;
        let record = parse_result(json, &BuildContext::default()).unwrap();
        assert_eq!(record.status(), FailureStatus::Broken);
        assert_eq!(record.error_signature(), "network_error:ECONNREFUSED");
        assert_eq!(record.framework(), Some("javascript"));
        assert_eq!(record.duration_ms(), None);
    }

    #[test]
    fn location_falls_back_to_full_name() {
        let json = r#"{"name":"t","fullName":"pkg.Class.t","status":"failed","labels":[]}"#;
        let record = parse_result(json, &BuildContext::default()).unwrap();
        assert_eq!(record.file_or_package(), "pkg.Class.t");
        assert_eq!(record.error_signature(), "unknown_error");
    }

    #[test]
    fn passing_and_skipped_results_are_ignored() {
        for status in ["passed", "skipped", "unknown"] {
            let json = format!(r#"{{"name":"t","status":"{status}"}}"#);
            assert!(parse_result(&json, &BuildContext::default()).is_none());
        }
        assert!(parse_result("garbage", &BuildContext::default()).is_none());
    }

    #[test]
    fn reads_directory_in_file_name_order_and_skips_bad_files() {
        let dir = std::env::temp_dir().join(format!("failtrack-allure-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        fs::write(
            dir.join("b-result.json"),
            r#"{"name":"second","status":"failed","statusDetails":{"message":"boom"}}"#,
        )
        .unwrap();
        fs::write(
            dir.join("a-result.json"),
            r#"{"name":"first","status":"broken","statusDetails":{"message":"bang"}}"#,
        )
        .unwrap();
        fs::write(dir.join("c-result.json"), "{ truncated").unwrap();
        fs::write(dir.join("d-container.json"), r#"{"name":"container"}"#).unwrap();

        let records = AllureResultsReader::new(&dir)
            .read(&BuildContext::default())
            .unwrap();
        let names: Vec<_> = records.iter().map(|r| r.test_name()).collect();
        assert_eq!(names, vec!["first", "second"]);

        let _ = fs::remove_dir_all(&dir);
    }
}
