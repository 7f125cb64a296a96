use std::fs::{self, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::AnalysisOutcome;
use crate::config::expand_home;
use crate::config::schema::HistoryConfig;
use crate::model::BuildContext;

/// Signatures kept per entry.
const TOP_SIGNATURES_PER_RUN: usize = 5;

// ---------------------------------------------------------------------------
// Run log entry (JSONL)
// ---------------------------------------------------------------------------

/// A single entry in the run history log.
///
/// Each entry records what one `analyze` run found and did. Used by the
/// reporter for `failtrack history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: String,
    /// Input kind: `"json-report"`, `"results-dir"` or `"console"`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    pub total_failures: usize,
    pub groups: usize,
    pub created: usize,
    pub commented: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub skipped: usize,
    /// Largest groups of the run, biggest first.
    #[serde(default)]
    pub top_signatures: Vec<SignatureCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCount {
    pub signature: String,
    pub count: usize,
}

impl RunLogEntry {
    pub fn from_outcome(outcome: &AnalysisOutcome, build: &BuildContext, dry_run: bool) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            source: outcome.source.clone(),
            branch: build.branch.clone(),
            build_number: build.build_number.clone(),
            dry_run,
            total_failures: outcome.total_failures,
            groups: outcome.groups.len(),
            created: outcome.created_issues().len(),
            commented: outcome.commented_issues().len(),
            failed: outcome.failed_count(),
            skipped: outcome.skipped_count(),
            top_signatures: outcome
                .groups
                .iter()
                .take(TOP_SIGNATURES_PER_RUN)
                .map(|g| SignatureCount {
                    signature: g.signature.clone(),
                    count: g.count,
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Resolved location of the history log.
pub fn history_path(config: &HistoryConfig) -> PathBuf {
    expand_home(&config.path)
}

/// Record a finished run. Failures are logged and never propagated.
pub fn log_run(config: &HistoryConfig, outcome: &AnalysisOutcome, build: &BuildContext, dry_run: bool) {
    if !config.enabled {
        return;
    }
    let path = history_path(config);
    let entry = RunLogEntry::from_outcome(outcome, build, dry_run);
    match append_entry(&path, &entry) {
        Ok(()) => debug!(path = %path.display(), "recorded run in history"),
        Err(error) => warn!(path = %path.display(), error = %format!("{error:#}"), "could not write run history"),
    }
}

/// Append one entry as a JSON line, creating the file and its directory.
pub fn append_entry(path: &Path, entry: &RunLogEntry) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).context("failed to create history directory")?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context("failed to open history log")?;
    let json = serde_json::to_string(entry).context("failed to serialize history entry")?;
    writeln!(file, "{json}").context("failed to write history entry")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Reading log entries
// ---------------------------------------------------------------------------

/// Read all entries from the history log.
///
/// Silently skips malformed lines. Returns an empty vec if the file does not
/// exist or cannot be read.
pub fn read_all_entries(path: &Path) -> Vec<RunLogEntry> {
    let Ok(file) = fs::File::open(path) else {
        return Vec::new();
    };

    BufReader::new(file)
        .lines()
        .map_while(std::io::Result::ok)
        .filter_map(|line| serde_json::from_str::<RunLogEntry>(&line).ok())
        .collect()
}

/// Read entries from the last `days` days, or all entries when `None`.
pub fn read_entries_since_days(path: &Path, days: Option<u32>) -> Vec<RunLogEntry> {
    let entries = read_all_entries(path);
    let Some(days) = days else {
        return entries;
    };
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
    filter_since(entries, cutoff)
}

fn filter_since(entries: Vec<RunLogEntry>, cutoff: DateTime<Utc>) -> Vec<RunLogEntry> {
    entries
        .into_iter()
        .filter(|e| {
            DateTime::parse_from_rfc3339(&e.timestamp)
                .map(|ts| ts.with_timezone(&Utc) >= cutoff)
                .unwrap_or(false)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
