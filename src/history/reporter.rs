//! History reporter: aggregate run entries for `failtrack history`.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::history::logger::{self, RunLogEntry};

/// Signatures listed in a summary.
const TOP_SIGNATURES: usize = 10;

// ---------------------------------------------------------------------------
// Aggregated summary
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize)]
pub struct HistorySummary {
    pub runs: usize,
    pub dry_runs: usize,
    pub total_failures: usize,
    pub issues_created: usize,
    pub issues_commented: usize,
    pub tracker_failures: usize,
    pub groups_skipped: usize,
    /// Most frequent signatures, by total failures.
    pub top_signatures: Vec<SignatureStat>,
    /// Per-day totals, oldest first.
    pub daily: Vec<DailyEntry>,
}

/// One signature aggregated across runs.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureStat {
    pub signature: String,
    /// Runs in which the signature was among the top groups.
    pub runs: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyEntry {
    pub date: String,
    pub runs: usize,
    pub failures: usize,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Summarize the log at `path`, optionally limited to the last `days` days.
pub fn compute_summary(path: &Path, days: Option<u32>) -> HistorySummary {
    let entries = logger::read_entries_since_days(path, days);
    summarize(&entries)
}

pub fn summarize(entries: &[RunLogEntry]) -> HistorySummary {
    if entries.is_empty() {
        return HistorySummary::default();
    }

    HistorySummary {
        runs: entries.len(),
        dry_runs: entries.iter().filter(|e| e.dry_run).count(),
        total_failures: entries.iter().map(|e| e.total_failures).sum(),
        issues_created: entries.iter().map(|e| e.created).sum(),
        issues_commented: entries.iter().map(|e| e.commented).sum(),
        tracker_failures: entries.iter().map(|e| e.failed).sum(),
        groups_skipped: entries.iter().map(|e| e.skipped).sum(),
        top_signatures: compute_signature_stats(entries),
        daily: compute_daily(entries),
    }
}

/// Sorted by total failures descending, then by name.
fn compute_signature_stats(entries: &[RunLogEntry]) -> Vec<SignatureStat> {
    let mut by_signature: HashMap<&str, (usize, usize)> = HashMap::new();
    for entry in entries {
        for top in &entry.top_signatures {
            let stat = by_signature.entry(top.signature.as_str()).or_default();
            stat.0 += 1;
            stat.1 += top.count;
        }
    }

    let mut stats: Vec<SignatureStat> = by_signature
        .into_iter()
        .map(|(signature, (runs, failures))| SignatureStat {
            signature: signature.to_string(),
            runs,
            failures,
        })
        .collect();

    stats.sort_by(|a, b| {
        b.failures
            .cmp(&a.failures)
            .then_with(|| a.signature.cmp(&b.signature))
    });
    stats.truncate(TOP_SIGNATURES);
    stats
}

fn compute_daily(entries: &[RunLogEntry]) -> Vec<DailyEntry> {
    let mut daily: HashMap<&str, (usize, usize)> = HashMap::new();
    for entry in entries {
        // RFC 3339: the first 10 chars are YYYY-MM-DD
        let date = entry.timestamp.get(..10).unwrap_or("unknown");
        let day = daily.entry(date).or_default();
        day.0 += 1;
        day.1 += entry.total_failures;
    }

    let mut days: Vec<DailyEntry> = daily
        .into_iter()
        .map(|(date, (runs, failures))| DailyEntry {
            date: date.to_string(),
            runs,
            failures,
        })
        .collect();
    days.sort_by(|a, b| a.date.cmp(&b.date));
    days
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
