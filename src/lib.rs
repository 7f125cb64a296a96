//! failtrack: turn failing test runs into deduplicated tracker issues.
//!
//! The pipeline: [`parser`] reads a test run into failure records, each
//! tagged with an error signature from [`signature`]; [`grouping`] buckets
//! them by signature; [`analysis`] matches each group against open issues
//! ([`dedup`]) and either comments on the match or files a new issue built
//! by [`issue`], through an [`tracker::IssueTracker`].

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod grouping;
pub mod history;
pub mod issue;
pub mod model;
pub mod parser;
pub mod signature;
pub mod telemetry;
pub mod tracker;
pub mod utils;
