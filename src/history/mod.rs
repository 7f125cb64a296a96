//! Local run history.
//!
//! Every `analyze` run appends one [`logger::RunLogEntry`] to a JSONL file
//! (`~/.failtrack/runs.jsonl` by default). `failtrack history` reads it back
//! and [`reporter`] aggregates it.

pub mod logger;
pub mod reporter;

pub use logger::{RunLogEntry, SignatureCount};
pub use reporter::{HistorySummary, summarize};
