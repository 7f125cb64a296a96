//! Result parsing: turn test-run output into [`FailureRecord`]s.
//!
//! Three input formats are supported, each behind the [`SourceReader`]
//! trait so the rest of the pipeline never sees format details:
//!
//! - [`jest::JestReportReader`]: a `--json` style report with a
//!   `testResults` array
//! - [`allure::AllureResultsReader`]: a directory of normalized per-test
//!   `*-result.json` files (any framework with an Allure adapter)
//! - [`console::ConsoleLogReader`]: raw console text from Jest or
//!   Playwright
//!
//! Readers degrade instead of failing: malformed input is logged and
//! skipped, and a missing source yields an empty list.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};

use crate::model::{BuildContext, FailureRecord};

pub mod allure;
pub mod console;
pub mod jest;

pub use allure::AllureResultsReader;
pub use console::ConsoleLogReader;
pub use jest::JestReportReader;

/// A format-specific adapter producing the common record shape.
pub trait SourceReader {
    /// Short identifier used in logs and the run history.
    fn name(&self) -> &'static str;

    /// Read every failing test, in discovery order.
    fn read(&self, ctx: &BuildContext) -> Result<Vec<FailureRecord>>;
}

/// Where the test results for a run come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSource {
    /// A single JSON test report file.
    JestReport(PathBuf),
    /// A directory of per-test result files.
    ResultsDir(PathBuf),
    /// Raw console output, already loaded into memory.
    Console(String),
}

impl ResultSource {
    /// The reader that understands this source.
    pub fn reader(&self) -> Box<dyn SourceReader + '_> {
        match self {
            Self::JestReport(path) => Box::new(JestReportReader::new(path)),
            Self::ResultsDir(dir) => Box::new(AllureResultsReader::new(dir)),
            Self::Console(text) => Box::new(ConsoleLogReader::new(text)),
        }
    }

    /// Short description for logs and history entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JestReport(_) => "json-report",
            Self::ResultsDir(_) => "results-dir",
            Self::Console(_) => "console",
        }
    }
}

/// Read failures from `source`.
///
/// Never fails: an absent source or a reader error is logged and results in
/// an empty list.
pub fn collect_failures(source: Option<&ResultSource>, ctx: &BuildContext) -> Vec<FailureRecord> {
    let Some(source) = source else {
        info!("no test report, result directory or console text provided; skipping analysis");
        return Vec::new();
    };

    let reader = source.reader();
    match reader.read(ctx) {
        Ok(records) => {
            info!(
                reader = reader.name(),
                failures = records.len(),
                "collected test failures"
            );
            records
        }
        Err(error) => {
            warn!(reader = reader.name(), error = %format!("{error:#}"), "could not read test results");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
