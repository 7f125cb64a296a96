//! CLI command implementations for failtrack.
//!
//! Provides subcommand handlers for:
//! - `failtrack analyze`: parse a test run, group failures, file or update issues
//! - `failtrack classify "message"`: show the signature a message maps to
//! - `failtrack history`: summary of past runs from the local history log
//! - `failtrack health`: check config, repository, token and tracker access
//! - `failtrack config show|init|set|reset`: configuration management

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use crate::analysis::{self, AnalysisContext, AnalysisOptions, AnalysisOutcome, GroupAction};
use crate::config::{self, FailtrackConfig};
use crate::history::logger;
use crate::history::reporter::{self, HistorySummary};
use crate::issue;
use crate::model::BuildContext;
use crate::parser::ResultSource;
use crate::signature;
use crate::tracker::{GitHubTracker, IssueTracker, MemoryTracker, UnavailableTracker};

/// Output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s {
            Some("json") => Self::Json,
            Some("csv") => Self::Csv,
            _ => Self::Table,
        }
    }
}

// ---------------------------------------------------------------------------
// failtrack analyze
// ---------------------------------------------------------------------------

/// Command-line inputs for `failtrack analyze`.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeArgs {
    /// JSON test report file.
    pub report: Option<PathBuf>,
    /// Directory of `*-result.json` files.
    pub results_dir: Option<PathBuf>,
    /// Console log file, or `-` for stdin.
    pub console: Option<String>,
    pub max_issues: Option<usize>,
    pub test_type: Option<String>,
    pub label: Option<String>,
    /// `owner/repo`.
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub build_number: Option<String>,
    pub build_url: Option<String>,
    pub workspace: Option<PathBuf>,
    pub dry_run: bool,
}

/// Analyze one test run and file or update issues.
///
/// Only configuration errors fail the command; missing input and tracker
/// problems are reported and the command still succeeds so that the
/// analysis never breaks the build.
pub fn run_analyze(args: AnalyzeArgs, format: OutputFormat) -> Result<()> {
    let mut cfg = config::load();
    apply_overrides(&mut cfg, &args)?;

    let ctx = AnalysisContext {
        build: build_context(&args),
        options: AnalysisOptions {
            dry_run: args.dry_run,
            ..AnalysisOptions::from_config(&cfg)
        },
    };
    let source = resolve_source(&args);

    let mut tracker: Box<dyn IssueTracker> = if args.dry_run {
        Box::new(preview_tracker(&cfg))
    } else {
        match GitHubTracker::from_config(&cfg.tracker) {
            Ok(tracker) => Box::new(tracker),
            Err(e) => Box::new(UnavailableTracker::new(format!("{e:#}"))),
        }
    };

    let outcome = analysis::analyze(source.as_ref(), &ctx, tracker.as_mut());
    logger::log_run(&cfg.history, &outcome, &ctx.build, args.dry_run);

    match format {
        OutputFormat::Json => print_outcome_json(&outcome, args.dry_run)?,
        OutputFormat::Csv => print_outcome_csv(&outcome),
        OutputFormat::Table => print_outcome_table(&outcome, args.dry_run),
    }
    Ok(())
}

/// Apply command-line overrides (highest precedence) to the loaded config.
fn apply_overrides(cfg: &mut FailtrackConfig, args: &AnalyzeArgs) -> Result<()> {
    if let Some(max) = args.max_issues {
        cfg.general.max_issues = max;
    }
    if let Some(test_type) = &args.test_type {
        cfg.general.test_type = test_type.clone();
    }
    if let Some(label) = &args.label {
        cfg.general.filter_label = label.clone();
    }
    if let Some(repository) = &args.repository {
        let (owner, repo) = config::parse_repository(repository)
            .with_context(|| format!("invalid repository '{repository}', expected owner/repo"))?;
        cfg.tracker.owner = owner;
        cfg.tracker.repo = repo;
    }
    Ok(())
}

/// Flags first, then the CI environment.
fn build_context(args: &AnalyzeArgs) -> BuildContext {
    BuildContext {
        branch: args.branch.clone(),
        build_number: args.build_number.clone(),
        build_url: args.build_url.clone(),
        job_name: None,
        workspace: args.workspace.clone(),
    }
    .or(BuildContext::from_env())
}

/// Pick the input for this run. An unreadable console file counts as no
/// input.
fn resolve_source(args: &AnalyzeArgs) -> Option<ResultSource> {
    if let Some(path) = &args.report {
        return Some(ResultSource::JestReport(path.clone()));
    }
    if let Some(dir) = &args.results_dir {
        return Some(ResultSource::ResultsDir(dir.clone()));
    }
    let console = args.console.as_deref()?;
    match read_text_input(console) {
        Ok(text) => Some(ResultSource::Console(text)),
        Err(e) => {
            warn!(input = console, error = %format!("{e:#}"), "console output not readable");
            None
        }
    }
}

/// Read a file, or stdin for `-`.
fn read_text_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        return Ok(text);
    }
    // Console logs are not always valid UTF-8.
    let bytes = fs::read(path).with_context(|| format!("failed to read {path}"))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// In-memory tracker seeded with the real open issues when the tracker is
/// reachable, so a dry run shows which groups would be comments.
fn preview_tracker(cfg: &FailtrackConfig) -> MemoryTracker {
    let tracker = match GitHubTracker::from_config(&cfg.tracker) {
        Ok(tracker) => tracker,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "dry run without tracker access; every group will show as new");
            return MemoryTracker::new();
        }
    };
    let labels = vec![cfg.general.filter_label.clone()];
    match tracker.fetch_open_issues(&labels) {
        Ok(issues) => {
            info!(open_issues = issues.len(), "dry run seeded with open issues");
            MemoryTracker::with_issues(issues)
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "dry run could not list open issues; every group will show as new");
            MemoryTracker::new()
        }
    }
}

fn print_outcome_table(outcome: &AnalysisOutcome, dry_run: bool) {
    let heading = if dry_run {
        "failtrack Analysis (dry run)"
    } else {
        "failtrack Analysis"
    };
    println!("{}", heading.bold().cyan());
    println!("{}", "=".repeat(60));
    println!(
        "  {} {}",
        "Source:  ".bold(),
        outcome.source.as_deref().unwrap_or("none")
    );
    println!("  {} {}", "Failures:".bold(), format_number(outcome.total_failures));
    println!("  {} {}", "Groups:  ".bold(), outcome.groups.len());

    if outcome.groups.is_empty() {
        println!();
        println!("{}", "No test failures found.".green());
        return;
    }

    println!();
    println!("  {:>6}  {:<10} {:>7}  Title", "Count", "Action", "Issue");
    println!("  {}", "-".repeat(58));
    for group in &outcome.groups {
        let (action, issue) = action_columns(&group.action);
        let action = match &group.action {
            GroupAction::Created(_) => action.green(),
            GroupAction::Commented(_) => action.blue(),
            GroupAction::Failed(_) => action.red(),
            GroupAction::Skipped => action.dimmed(),
        };
        println!(
            "  {:>6}  {:<10} {:>7}  {}",
            group.count,
            action,
            issue,
            truncate(&group.title, 70)
        );
        if let GroupAction::Failed(reason) = &group.action {
            println!("  {:>6}  {}", "", truncate(reason, 80).dimmed());
        }
    }

    let created = outcome.created_issues();
    let commented = outcome.commented_issues();
    println!();
    println!(
        "  {} created, {} commented, {} failed, {} skipped",
        created.len(),
        commented.len(),
        outcome.failed_count(),
        outcome.skipped_count()
    );
}

fn print_outcome_json(outcome: &AnalysisOutcome, dry_run: bool) -> Result<()> {
    let mut value = serde_json::to_value(outcome).context("failed to serialize outcome")?;
    value["dry_run"] = serde_json::json!(dry_run);
    value["created_issues"] = serde_json::json!(outcome.created_issues());
    value["commented_issues"] = serde_json::json!(outcome.commented_issues());
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_outcome_csv(outcome: &AnalysisOutcome) {
    println!("signature,count,action,issue,title");
    for group in &outcome.groups {
        let (action, issue) = action_columns(&group.action);
        println!(
            "{},{},{},{},{}",
            csv_field(&group.signature),
            group.count,
            action,
            issue,
            csv_field(&group.title)
        );
    }
}

/// Action name and issue number column for a group.
fn action_columns(action: &GroupAction) -> (&'static str, String) {
    match action {
        GroupAction::Created(n) => ("created", format!("#{n}")),
        GroupAction::Commented(n) => ("commented", format!("#{n}")),
        GroupAction::Failed(_) => ("failed", String::new()),
        GroupAction::Skipped => ("skipped", String::new()),
    }
}

// ---------------------------------------------------------------------------
// failtrack classify
// ---------------------------------------------------------------------------

/// Show how a failure message is classified. `-` reads the message from stdin.
pub fn run_classify(message: &str, format: OutputFormat) -> Result<()> {
    let message = if message == "-" {
        read_text_input("-")?
    } else {
        message.to_string()
    };

    let cfg = config::load();
    let signature = signature::extract(&message);
    let rule = signature::rule_for(&message);
    let summary = issue::summary(&signature);
    let labels = issue::labels(&signature, &AnalysisOptions::from_config(&cfg));

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "signature": signature,
                "rule": rule,
                "summary": summary,
                "labels": labels,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Csv => {
            println!("signature,rule,summary,labels");
            println!(
                "{},{},{},{}",
                csv_field(&signature),
                rule.unwrap_or("fallback"),
                csv_field(&summary),
                csv_field(&labels.into_iter().collect::<Vec<_>>().join(";"))
            );
        }
        OutputFormat::Table => {
            println!("  {} {}", "Signature:".bold(), signature.cyan());
            println!(
                "  {} {}",
                "Rule:     ".bold(),
                rule.map(|r| r.normal()).unwrap_or_else(|| "fallback".yellow())
            );
            println!("  {} {}", "Summary:  ".bold(), summary);
            println!(
                "  {} {}",
                "Labels:   ".bold(),
                labels.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// failtrack history
// ---------------------------------------------------------------------------

/// Summarize past runs from the history log.
pub fn run_history(days: Option<u32>, format: OutputFormat) -> Result<()> {
    let cfg = config::load();
    let path = logger::history_path(&cfg.history);
    let summary = reporter::compute_summary(&path, days);

    if summary.runs == 0 {
        println!(
            "{}",
            "No runs recorded yet. Run `failtrack analyze` to start the history.".yellow()
        );
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Csv => print_history_csv(&summary),
        OutputFormat::Table => print_history_table(&summary, days),
    }
    Ok(())
}

fn print_history_table(summary: &HistorySummary, days: Option<u32>) {
    let heading = match days {
        Some(days) => format!("failtrack History (last {days} days)"),
        None => "failtrack History".to_string(),
    };
    println!("{}", heading.bold().cyan());
    println!("{}", "=".repeat(60));
    println!();

    println!("  {} {}", "Runs:            ".bold(), summary.runs);
    if summary.dry_runs > 0 {
        println!("  {} {}", "  of which dry:   ".bold(), summary.dry_runs);
    }
    println!("  {} {}", "Failures seen:   ".bold(), format_number(summary.total_failures));
    println!("  {} {}", "Issues created:  ".bold(), summary.issues_created);
    println!("  {} {}", "Issues commented:".bold(), summary.issues_commented);
    if summary.tracker_failures > 0 {
        println!(
            "  {} {}",
            "Tracker failures:".bold(),
            summary.tracker_failures.to_string().red()
        );
    }
    println!();

    if !summary.top_signatures.is_empty() {
        println!("{}", "Most Frequent Signatures".bold().cyan());
        println!("  {:<50} {:>6} {:>9}", "Signature", "Runs", "Failures");
        println!("  {}", "-".repeat(67));
        for (i, stat) in summary.top_signatures.iter().enumerate() {
            let line = format!(
                "  {:<50} {:>6} {:>9}",
                truncate(&stat.signature, 50),
                stat.runs,
                format_number(stat.failures)
            );
            if i % 2 == 0 {
                println!("{line}");
            } else {
                println!("{}", line.dimmed());
            }
        }
        println!();
    }

    if !summary.daily.is_empty() {
        println!("{}", "Daily".bold().cyan());
        println!("  {:<12} {:>6} {:>9}", "Date", "Runs", "Failures");
        println!("  {}", "-".repeat(29));
        for day in &summary.daily {
            println!("  {:<12} {:>6} {:>9}", day.date, day.runs, format_number(day.failures));
        }
    }
}

fn print_history_csv(summary: &HistorySummary) {
    println!("signature,runs,failures");
    for stat in &summary.top_signatures {
        println!("{},{},{}", csv_field(&stat.signature), stat.runs, stat.failures);
    }
}

// ---------------------------------------------------------------------------
// failtrack health
// ---------------------------------------------------------------------------

/// Check config files, repository, token, tracker access and history log.
pub fn run_health() -> Result<()> {
    println!("{}", "failtrack Health Check".bold().cyan());
    println!("{}", "=".repeat(40));

    // 1. Config files
    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let cfg = config::load();
    print_health_item(
        "Global config",
        global_exists,
        if global_exists {
            "~/.failtrack/config.toml found"
        } else {
            "not found (run `failtrack config init` to create)"
        },
    );
    print_health_item(
        "Project config",
        project_exists,
        if project_exists {
            ".failtrack.toml found"
        } else {
            "none (optional)"
        },
    );

    // 2. Repository and token
    let repository = cfg.tracker.repository();
    print_health_item(
        "Repository",
        repository.is_some(),
        &repository
            .clone()
            .unwrap_or_else(|| "not set (tracker.owner/tracker.repo or FAILTRACK_REPOSITORY)".to_string()),
    );
    let token_set = std::env::var(&cfg.tracker.token_env)
        .map(|t| !t.trim().is_empty())
        .unwrap_or(false);
    print_health_item(
        "Token",
        token_set,
        &if token_set {
            format!("${} is set", cfg.tracker.token_env)
        } else {
            format!("${} is not set", cfg.tracker.token_env)
        },
    );

    // 3. Tracker access
    if repository.is_some() && token_set {
        let access = GitHubTracker::from_config(&cfg.tracker).and_then(|t| t.check_access());
        match access {
            Ok(()) => print_health_item("Tracker access", true, &format!("reachable at {}", cfg.tracker.api_url)),
            Err(e) => print_health_item("Tracker access", false, &truncate(&format!("{e:#}"), 60)),
        }
    }

    // 4. History log
    let history_path = logger::history_path(&cfg.history);
    if cfg.history.enabled {
        let entries = logger::read_all_entries(&history_path).len();
        let exists = history_path.exists();
        print_health_item(
            "Run history",
            exists,
            &if exists {
                format!("{entries} runs in {}", history_path.display())
            } else {
                "no history file yet".to_string()
            },
        );
    } else {
        print_health_item("Run history", true, "disabled");
    }

    Ok(())
}

fn print_health_item(name: &str, ok: bool, detail: &str) {
    let status = if ok {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("  {} {:<25} {}", status, name, detail.dimmed());
}

// ---------------------------------------------------------------------------
// failtrack config show | init | set | reset
// ---------------------------------------------------------------------------

/// Show the effective (merged) configuration as TOML.
pub fn run_config_show() -> Result<()> {
    let toml_str = config::show_effective_config()?;
    println!("{}", "Effective failtrack Configuration".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();
    println!("{toml_str}");

    let global_exists = config::global_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    let project_exists = config::project_config_file()
        .map(|p| p.exists())
        .unwrap_or(false);
    println!("{}", "Sources (highest priority last):".dimmed());
    println!("  {} built-in defaults", "·".dimmed());
    if global_exists {
        println!("  {} {}", "✓".green(), "~/.failtrack/config.toml".dimmed());
    } else {
        println!(
            "  {} {}",
            "·".dimmed(),
            "~/.failtrack/config.toml (not found)".dimmed()
        );
    }
    if project_exists {
        println!("  {} {}", "✓".green(), ".failtrack.toml".dimmed());
    } else {
        println!("  {} {}", "·".dimmed(), ".failtrack.toml (not found)".dimmed());
    }
    println!(
        "  {} {}",
        "·".dimmed(),
        "FAILTRACK_* environment variables".dimmed()
    );
    println!("  {} {}", "·".dimmed(), "command-line flags".dimmed());

    Ok(())
}

/// Initialize a default config file at `~/.failtrack/config.toml`.
pub fn run_config_init(force: bool) -> Result<()> {
    let path = config::init_config(force)?;
    println!(
        "{} Config written to {}",
        "✓".green().bold(),
        path.display()
    );
    println!(
        "  {}",
        "Set tracker.owner and tracker.repo before the first run.".dimmed()
    );
    Ok(())
}

/// Set a single configuration value in the global config file.
pub fn run_config_set(key: &str, value: &str) -> Result<()> {
    config::set_config_value(key, value)?;
    println!("{} Set {} = {}", "✓".green().bold(), key.bold(), value);
    Ok(())
}

/// Reset configuration to defaults.
pub fn run_config_reset() -> Result<()> {
    let path = config::reset_config()?;
    println!(
        "{} Config reset to defaults at {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Format a number with comma separators for readability.
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

/// Truncate a string to `max_len` characters, appending "…" if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hell…");
        assert_eq!(truncate("ab", 2), "ab");
        assert_eq!(truncate("suite › test › name", 8), "suite ›…");
    }

    #[test]
    fn test_csv_field() {
        assert_eq!(csv_field("timeout_error"), "timeout_error");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!(OutputFormat::from_str_opt(None), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str_opt(Some("json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str_opt(Some("csv")), OutputFormat::Csv);
        assert_eq!(
            OutputFormat::from_str_opt(Some("unknown")),
            OutputFormat::Table
        );
    }

    #[test]
    fn overrides_take_precedence() {
        let mut cfg = FailtrackConfig::default();
        let args = AnalyzeArgs {
            max_issues: Some(2),
            test_type: Some("E2E".to_string()),
            label: Some("e2e-failure".to_string()),
            repository: Some("acme/web".to_string()),
            ..Default::default()
        };
        apply_overrides(&mut cfg, &args).unwrap();
        assert_eq!(cfg.general.max_issues, 2);
        assert_eq!(cfg.general.test_type, "E2E");
        assert_eq!(cfg.general.filter_label, "e2e-failure");
        assert_eq!(cfg.tracker.repository().as_deref(), Some("acme/web"));

        let bad = AnalyzeArgs {
            repository: Some("not-a-repo".to_string()),
            ..Default::default()
        };
        assert!(apply_overrides(&mut cfg, &bad).is_err());
    }

    #[test]
    fn source_resolution_order() {
        let args = AnalyzeArgs {
            report: Some(PathBuf::from("report.json")),
            results_dir: Some(PathBuf::from("allure-results")),
            ..Default::default()
        };
        assert_eq!(
            resolve_source(&args),
            Some(ResultSource::JestReport(PathBuf::from("report.json")))
        );

        assert_eq!(resolve_source(&AnalyzeArgs::default()), None);

        let missing_console = AnalyzeArgs {
            console: Some("/no/such/console.log".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_source(&missing_console), None);
    }

    #[test]
    fn console_file_is_read_lossily() {
        let path = std::env::temp_dir().join(format!("failtrack-console-{}.log", std::process::id()));
        fs::write(&path, b"FAIL a.test.js\n\xff\n").unwrap();
        let args = AnalyzeArgs {
            console: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        match resolve_source(&args) {
            Some(ResultSource::Console(text)) => assert!(text.starts_with("FAIL a.test.js")),
            other => panic!("unexpected source: {other:?}"),
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn action_columns_render_issue_numbers() {
        assert_eq!(action_columns(&GroupAction::Created(4)), ("created", "#4".to_string()));
        assert_eq!(action_columns(&GroupAction::Commented(9)), ("commented", "#9".to_string()));
        assert_eq!(action_columns(&GroupAction::Skipped), ("skipped", String::new()));
    }
}
