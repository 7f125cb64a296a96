/// Configuration schema and defaults for failtrack.
///
/// Defines the TOML-serializable configuration structure with all sections:
/// `[general]`, `[tracker]`, `[report]` and `[history]`.
///
/// Every field has a built-in default. Users only need to set the values
/// they want to override.
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level failtrack configuration.
///
/// Maps directly to `~/.failtrack/config.toml` and `.failtrack.toml`.
/// Missing sections and fields fall back to built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FailtrackConfig {
    pub general: GeneralConfig,
    pub tracker: TrackerConfig,
    pub report: ReportConfig,
    pub history: HistoryConfig,
}

// ---------------------------------------------------------------------------
// [general]
// ---------------------------------------------------------------------------

/// Analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Maximum number of failure groups filed or updated per run.
    pub max_issues: usize,
    /// Label used in issue titles: `"<test_type> Failure: ..."`.
    pub test_type: String,
    /// Label that marks automatically filed issues. Used to list existing
    /// open issues and always attached to new ones.
    pub filter_label: String,
    /// Labels attached to every new issue.
    pub base_labels: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            max_issues: 10,
            test_type: "Test".to_string(),
            filter_label: "automated-test-failure".to_string(),
            base_labels: vec!["bug".to_string(), "testing".to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// [tracker]
// ---------------------------------------------------------------------------

/// Issue tracker (GitHub REST API) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// API base URL, e.g. `https://api.github.com` or a GHE `.../api/v3`.
    pub api_url: String,
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Name of the environment variable holding the API token. The token
    /// itself never lives in a config file.
    pub token_env: String,
    /// Per-request timeout (milliseconds).
    pub timeout_ms: u64,
    /// Extra attempts for transient failures (network, 429, 5xx).
    pub max_retries: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub retry_base_ms: u64,
    /// Maximum pages fetched when listing open issues.
    pub max_pages: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            token_env: "GITHUB_TOKEN".to_string(),
            timeout_ms: 15_000,
            max_retries: 2,
            retry_base_ms: 500,
            max_pages: 10,
        }
    }
}

impl TrackerConfig {
    /// `owner/repo`, or `None` when either half is missing.
    pub fn repository(&self) -> Option<String> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            None
        } else {
            Some(format!("{}/{}", self.owner, self.repo))
        }
    }
}

// ---------------------------------------------------------------------------
// [report]
// ---------------------------------------------------------------------------

/// Limits applied when rendering issue bodies and comments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Maximum characters of the representative error shown.
    pub max_error_chars: usize,
    /// Maximum affected files/packages listed.
    pub max_files: usize,
    /// Maximum affected tests listed in a new issue.
    pub max_tests_in_body: usize,
    /// Maximum affected tests listed in an update comment.
    pub max_tests_in_comment: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_error_chars: 2000,
            max_files: 20,
            max_tests_in_body: 50,
            max_tests_in_comment: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// [history]
// ---------------------------------------------------------------------------

/// Local run history (JSONL) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Whether each run is appended to the history log.
    pub enabled: bool,
    /// Path to the history log. `~` is expanded to the home directory.
    pub path: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "~/.failtrack/runs.jsonl".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default TOML content
// ---------------------------------------------------------------------------

impl FailtrackConfig {
    /// Generate the annotated default TOML config file content.
    ///
    /// Used by `failtrack config init`.
    pub fn default_toml() -> String {
        r#"# failtrack configuration
#
# Configuration hierarchy (highest precedence wins):
#   1. Command-line flags
#   2. Environment variables (FAILTRACK_*)
#   3. Project config (.failtrack.toml in current directory)
#   4. User global config (~/.failtrack/config.toml)
#   5. Built-in defaults
#
# Diagnostic logging is controlled by FAILTRACK_LOG (e.g. "debug",
# "failtrack=trace") and the --log-json flag.

[general]
max_issues = 10                          # Failure groups filed/updated per run
test_type = "Test"                       # Titles read "<test_type> Failure: ..."
filter_label = "automated-test-failure"  # Marks issues owned by failtrack
base_labels = ["bug", "testing"]

[tracker]
api_url = "https://api.github.com"
owner = ""                               # or FAILTRACK_REPOSITORY=owner/repo
repo = ""
token_env = "GITHUB_TOKEN"               # Environment variable holding the token
timeout_ms = 15000
max_retries = 2                          # Retries for network errors, 429 and 5xx
retry_base_ms = 500
max_pages = 10

[report]
max_error_chars = 2000
max_files = 20
max_tests_in_body = 50
max_tests_in_comment = 30

[history]
enabled = true
path = "~/.failtrack/runs.jsonl"
"#
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
