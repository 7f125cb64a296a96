//! Reader for raw console output.
//!
//! Scans line by line for two kinds of markers:
//!
//! - **start of failure**: Jest `FAIL <path>` sets the current file
//! - **start of test**: Jest `● Suite › test`, or a Playwright header
//!   `1) [chromium] › tests/a.spec.ts:12:5 › suite › test ───`
//!
//! Lines after a test marker are collected as that test's error body until
//! the next test marker, a `PASS`/`FAIL` line, the run summary, or the end
//! of input.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;

use super::SourceReader;
use super::jest::SUITE_FAILURE_NAME;
use crate::model::{BuildContext, FailureRecord, FailureStatus};
use crate::utils::text::{dedent_block, strip_ansi};

static JEST_FAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*FAIL\s+(\S+)").expect("jest FAIL regex must compile"));

static JEST_PASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*PASS\s+\S+").expect("jest PASS regex must compile"));

static JEST_TEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*●\s+(.+?)\s*$").expect("jest test regex must compile"));

static PLAYWRIGHT_TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\)\s+(?:\[[^\]]+\]\s+›\s+)?(\S+?):\d+:\d+\s+›\s+(.+?)\s*─*\s*$")
        .expect("playwright test regex must compile")
});

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:Test Suites:|Tests:|Snapshots:|Time:|Ran all test suites|\d+ (?:failed|passed|flaky|skipped|did not run|interrupted)(?:\s+\(\d+(?:\.\d+)?(?:ms|s|m|h)\))?\s*$)",
    )
    .expect("summary regex must compile")
});

/// Jest prints captured `console.log` output under this pseudo-test.
const JEST_CONSOLE_BLOCK: &str = "Console";

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

pub struct ConsoleLogReader<'a> {
    text: &'a str,
}

impl<'a> ConsoleLogReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }
}

impl SourceReader for ConsoleLogReader<'_> {
    fn name(&self) -> &'static str {
        "console"
    }

    fn read(&self, ctx: &BuildContext) -> Result<Vec<FailureRecord>> {
        Ok(parse_console(self.text, ctx))
    }
}

/// A test block being accumulated.
struct Block {
    file: String,
    name: String,
    framework: &'static str,
    lines: Vec<String>,
}

impl Block {
    fn into_record(self, ctx: &BuildContext) -> FailureRecord {
        let lines: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        let message = dedent_block(&lines);
        let status = if self.name == SUITE_FAILURE_NAME {
            FailureStatus::Broken
        } else {
            FailureStatus::Failed
        };
        FailureRecord::new(self.name, ctx.relative_path(&self.file), message, status)
            .with_framework(self.framework)
    }
}

/// Extract failing test blocks from console text.
pub fn parse_console(text: &str, ctx: &BuildContext) -> Vec<FailureRecord> {
    let mut records = Vec::new();
    let mut current_file = String::new();
    let mut current: Option<Block> = None;
    // Inside a block we do not report (e.g. Jest console output).
    let mut ignoring = false;

    for raw_line in text.lines() {
        let line = strip_ansi(raw_line);

        if let Some(caps) = JEST_FAIL_RE.captures(&line) {
            records.extend(current.take().map(|b| b.into_record(ctx)));
            ignoring = false;
            current_file = caps[1].to_string();
            continue;
        }

        if JEST_PASS_RE.is_match(&line) || SUMMARY_RE.is_match(&line) {
            records.extend(current.take().map(|b| b.into_record(ctx)));
            ignoring = false;
            continue;
        }

        if let Some(caps) = PLAYWRIGHT_TEST_RE.captures(&line) {
            records.extend(current.take().map(|b| b.into_record(ctx)));
            ignoring = false;
            current = Some(Block {
                file: caps[1].to_string(),
                name: caps[2].to_string(),
                framework: "playwright",
                lines: Vec::new(),
            });
            continue;
        }

        if let Some(caps) = JEST_TEST_RE.captures(&line) {
            records.extend(current.take().map(|b| b.into_record(ctx)));
            let name = caps[1].to_string();
            ignoring = name == JEST_CONSOLE_BLOCK;
            if !ignoring {
                current = Some(Block {
                    file: current_file.clone(),
                    name,
                    framework: "jest",
                    lines: Vec::new(),
                });
            }
            continue;
        }

        if ignoring {
            continue;
        }
        if let Some(block) = current.as_mut() {
            block.lines.push(line.into_owned());
        }
    }

    records.extend(current.take().map(|b| b.into_record(ctx)));
    records
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
