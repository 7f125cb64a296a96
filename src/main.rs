use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

use failtrack::cli::{self, AnalyzeArgs, OutputFormat};
use failtrack::telemetry;

#[derive(Debug, Parser)]
#[command(name = "failtrack")]
#[command(version)]
#[command(about = "Group failing tests by error signature and file deduplicated issues")]
struct App {
    /// Emit diagnostics as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    /// Debug-level diagnostics
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Warnings and errors only
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a test run, group failures and file or update issues
    Analyze {
        /// JSON test report (Jest `--json` output)
        #[arg(long, group = "input")]
        report: Option<PathBuf>,
        /// Directory of `*-result.json` files
        #[arg(long, group = "input")]
        results_dir: Option<PathBuf>,
        /// Console log file, or `-` to read stdin
        #[arg(long, group = "input")]
        console: Option<String>,
        /// Maximum number of groups to act on
        #[arg(long)]
        max_issues: Option<usize>,
        /// Test suite kind shown in titles, e.g. "E2E"
        #[arg(long)]
        test_type: Option<String>,
        /// Label that marks issues managed by failtrack
        #[arg(long)]
        label: Option<String>,
        /// Target repository as owner/repo
        #[arg(long)]
        repository: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        build_number: Option<String>,
        #[arg(long)]
        build_url: Option<String>,
        /// Root that absolute file paths are made relative to
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Show what would be filed without writing to the tracker
        #[arg(long)]
        dry_run: bool,
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Show the signature, title and labels a failure message maps to
    Classify {
        /// The failure message, or `-` to read stdin
        message: String,
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Summarize past analysis runs
    History {
        /// Only include the last N days of data
        #[arg(long)]
        days: Option<u32>,
        /// Output format: table (default), json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Check config, repository, token and tracker access
    Health,
    /// Manage failtrack configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default config to ~/.failtrack/config.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Set a value, e.g. `general.max_issues 5`
    Set { key: String, value: String },
    /// Reset the global config to defaults
    Reset,
}

fn main() -> Result<()> {
    let app = App::parse();

    let level = if app.verbose {
        Level::DEBUG
    } else if app.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    telemetry::init_tracing(app.log_json, level);

    match app.command {
        Commands::Analyze {
            report,
            results_dir,
            console,
            max_issues,
            test_type,
            label,
            repository,
            branch,
            build_number,
            build_url,
            workspace,
            dry_run,
            format,
        } => {
            let args = AnalyzeArgs {
                report,
                results_dir,
                console,
                max_issues,
                test_type,
                label,
                repository,
                branch,
                build_number,
                build_url,
                workspace,
                dry_run,
            };
            cli::run_analyze(args, OutputFormat::from_str_opt(Some(&format)))
        }
        Commands::Classify { message, format } => {
            cli::run_classify(&message, OutputFormat::from_str_opt(Some(&format)))
        }
        Commands::History { days, format } => {
            cli::run_history(days, OutputFormat::from_str_opt(Some(&format)))
        }
        Commands::Health => cli::run_health(),
        Commands::Config { action } => match action {
            ConfigAction::Show => cli::run_config_show(),
            ConfigAction::Init { force } => cli::run_config_init(force),
            ConfigAction::Set { key, value } => cli::run_config_set(&key, &value),
            ConfigAction::Reset => cli::run_config_reset(),
        },
    }
}
