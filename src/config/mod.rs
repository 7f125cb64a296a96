/// Configuration system for failtrack.
///
/// Provides a layered configuration hierarchy:
///
/// 1. **Built-in defaults**: hardcoded in [`schema::FailtrackConfig::default()`]
/// 2. **User global config**: `~/.failtrack/config.toml`
/// 3. **Project local config**: `.failtrack.toml` in the current working directory
/// 4. **Environment variables**: `FAILTRACK_*` overrides
///
/// Command-line flags are applied on top by the CLI. Later layers override
/// earlier ones at the key level: the TOML layers are merged as tables
/// before deserializing, so a project file that sets one key leaves the
/// rest of the global file intact.
///
/// # Usage
///
/// ```rust,ignore
/// use failtrack::config;
///
/// let cfg = config::load();
/// println!("filing at most {} issues", cfg.general.max_issues);
/// ```
pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

pub use schema::FailtrackConfig;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the fully resolved failtrack configuration.
///
/// Merges defaults → global TOML → project TOML → env vars. A malformed
/// file is logged and skipped; loading itself never fails.
pub fn load() -> FailtrackConfig {
    let layers = [global_config_path(), project_config_path()];
    let mut config = load_layers(layers.iter().flatten().map(PathBuf::as_path));
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

/// Merge the TOML files at `paths` (later wins) over the defaults.
fn load_layers<'a>(paths: impl Iterator<Item = &'a Path>) -> FailtrackConfig {
    let mut merged = toml::Value::Table(toml::map::Map::new());
    for path in paths {
        if let Some(layer) = load_toml_file(path) {
            merge_values(&mut merged, layer);
        }
    }

    match merged.try_into::<FailtrackConfig>() {
        Ok(config) => config,
        Err(error) => {
            warn!(%error, "config layers have invalid values; using defaults");
            FailtrackConfig::default()
        }
    }
}

/// Read a TOML file as an untyped value.
///
/// Returns `None` when the file doesn't exist or can't be parsed.
fn load_toml_file(path: &Path) -> Option<toml::Value> {
    let content = fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring malformed config file");
            None
        }
    }
}

/// Recursively overlay `overlay` onto `base`. Tables merge key by key;
/// any other value replaces what was there.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

/// Path to the user global config: `~/.failtrack/config.toml`.
fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".failtrack").join("config.toml"))
}

/// Path to the project local config: `.failtrack.toml` in the current directory.
fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(".failtrack.toml"))
}

/// Return the path to the global config file for display/init purposes.
pub fn global_config_file() -> Option<PathBuf> {
    global_config_path()
}

/// Return the path to the project config file for display purposes.
pub fn project_config_file() -> Option<PathBuf> {
    project_config_path()
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\"))
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Supported variables:
/// - `FAILTRACK_MAX_ISSUES`: groups filed/updated per run
/// - `FAILTRACK_TEST_TYPE`: title prefix (`Test`, `E2E`, ...)
/// - `FAILTRACK_FILTER_LABEL`: label marking automatically filed issues
/// - `FAILTRACK_TRACKER_URL`: API base URL
/// - `FAILTRACK_REPOSITORY`: `owner/repo`
/// - `FAILTRACK_TOKEN_ENV`: name of the variable holding the token
/// - `FAILTRACK_HISTORY`: run history on/off (`1`/`true`/`yes`/`on`)
fn apply_env_overrides(config: &mut FailtrackConfig, var: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    // General
    if let Some(val) = non_empty("FAILTRACK_MAX_ISSUES") {
        match val.trim().parse::<usize>() {
            Ok(n) => config.general.max_issues = n,
            Err(_) => warn!(value = %val, "ignoring non-numeric FAILTRACK_MAX_ISSUES"),
        }
    }
    if let Some(val) = non_empty("FAILTRACK_TEST_TYPE") {
        config.general.test_type = val;
    }
    if let Some(val) = non_empty("FAILTRACK_FILTER_LABEL") {
        config.general.filter_label = val;
    }

    // Tracker
    if let Some(val) = non_empty("FAILTRACK_TRACKER_URL") {
        config.tracker.api_url = val;
    }
    if let Some(val) = non_empty("FAILTRACK_REPOSITORY") {
        match parse_repository(&val) {
            Some((owner, repo)) => {
                config.tracker.owner = owner;
                config.tracker.repo = repo;
            }
            None => warn!(value = %val, "FAILTRACK_REPOSITORY must look like owner/repo"),
        }
    }
    if let Some(val) = non_empty("FAILTRACK_TOKEN_ENV") {
        config.tracker.token_env = val;
    }

    // History
    if let Some(val) = non_empty("FAILTRACK_HISTORY") {
        config.history.enabled = is_truthy(&val);
    }
}

/// Split `owner/repo`. Both halves must be non-empty.
pub fn parse_repository(val: &str) -> Option<(String, String)> {
    let (owner, repo) = val.trim().split_once('/')?;
    let (owner, repo) = (owner.trim(), repo.trim().trim_end_matches(".git"));
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

/// Check if a string value represents a truthy boolean.
fn is_truthy(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ---------------------------------------------------------------------------
// Config init / set / reset
// ---------------------------------------------------------------------------

/// Write the default annotated config to `~/.failtrack/config.toml`.
///
/// Creates the `~/.failtrack/` directory if it doesn't exist. Returns an
/// error if the file already exists (use `force = true` to overwrite).
pub fn init_config(force: bool) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;
    write_default_config(&path, force)?;
    Ok(path)
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }

    fs::write(path, FailtrackConfig::default_toml()).context("failed to write config file")
}

/// Set a single config key to a value in the global config file.
///
/// Reads the current global config (or defaults), updates the specified key,
/// and writes the result back. Supports dotted keys like `tracker.owner`.
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let path = global_config_path().context("could not determine home directory")?;
    set_config_value_at(&path, key, value)
}

fn set_config_value_at(path: &Path, key: &str, value: &str) -> Result<()> {
    // Missing sections/keys in a hand-written file are filled from the
    // defaults so that any known key can be set.
    let mut root = toml::Value::try_from(FailtrackConfig::default())
        .context("failed to serialize default config")?;
    if path.exists() {
        let content = fs::read_to_string(path).context("failed to read config file")?;
        let existing: toml::Value =
            toml::from_str(&content).context("failed to parse config as TOML value")?;
        merge_values(&mut root, existing);
    }

    set_toml_value(&mut root, key, value)?;

    // Reject values that would make the file unloadable.
    root.clone()
        .try_into::<FailtrackConfig>()
        .with_context(|| format!("invalid value for '{key}': '{value}'"))?;

    let output = toml::to_string_pretty(&root).context("failed to serialize updated config")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    fs::write(path, output).context("failed to write config file")
}

/// Set a value in a TOML value tree using a dotted key path.
fn set_toml_value(root: &mut toml::Value, key: &str, raw_value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        anyhow::bail!("invalid config key: '{key}'");
    }

    // Navigate to the parent table
    let mut current = root;
    for &part in &parts[..parts.len() - 1] {
        current = current
            .get_mut(part)
            .with_context(|| format!("config key not found: section '{part}' in '{key}'"))?;
    }

    let leaf = parts[parts.len() - 1];

    let table = current.as_table_mut().with_context(|| {
        format!(
            "expected table at '{}'",
            key.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
        )
    })?;

    let new_value = match table.get(leaf) {
        None => anyhow::bail!("config key not found: '{key}'"),
        Some(toml::Value::Boolean(_)) => toml::Value::Boolean(is_truthy(raw_value)),
        Some(toml::Value::Integer(_)) => {
            let n: i64 = raw_value
                .parse()
                .with_context(|| format!("expected integer for '{key}', got '{raw_value}'"))?;
            toml::Value::Integer(n)
        }
        Some(toml::Value::Array(_)) => {
            // Comma-separated list
            let items: Vec<toml::Value> = raw_value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_string()))
                .collect();
            toml::Value::Array(items)
        }
        Some(toml::Value::Table(_)) => {
            anyhow::bail!("'{key}' is a section; set one of its keys instead")
        }
        Some(_) => toml::Value::String(raw_value.to_string()),
    };

    table.insert(leaf.to_string(), new_value);
    Ok(())
}

/// Reset the global config to defaults (overwrite the file).
pub fn reset_config() -> Result<PathBuf> {
    init_config(true)
}

/// Show the effective (fully resolved) config as TOML.
pub fn show_effective_config() -> Result<String> {
    let config = load();
    toml::to_string_pretty(&config).context("failed to serialize effective config")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
