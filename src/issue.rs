//! Issue text generation: titles, Markdown bodies, update comments and
//! labels for a [`FailureGroup`].
//!
//! The body line ``Error Signature: `<signature>` `` is what the duplicate
//! matcher looks for on later runs, so its exact format must not change.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::analysis::{AnalysisContext, AnalysisOptions};
use crate::model::{BuildContext, FailureGroup, IssueDraft};
use crate::utils::text::truncate_chars;

/// Longest raw signature shown in a title before it is cut.
const MAX_TITLE_SIGNATURE_CHARS: usize = 60;

/// The line the duplicate matcher searches issue bodies for.
pub fn signature_line(signature: &str) -> String {
    format!("Error Signature: `{signature}`")
}

// ---------------------------------------------------------------------------
// Titles
// ---------------------------------------------------------------------------

/// `"<test_type> Failure: <summary> (<n> test|tests)"`.
pub fn title(signature: &str, group: &FailureGroup, test_type: &str) -> String {
    let count = group.len();
    let noun = if count == 1 { "test" } else { "tests" };
    format!("{test_type} Failure: {} ({count} {noun})", summary(signature))
}

/// Human-readable summary of a signature for use in titles.
pub fn summary(signature: &str) -> String {
    if let Some(name) = signature.strip_prefix("missing_module:") {
        return format!("Missing module '{name}'");
    }
    if signature.starts_with("timeout_error") {
        return "Timeout errors".to_string();
    }
    if signature == "type_error:not_a_function" {
        return "TypeError: not a function".to_string();
    }
    if let Some(what) = signature.strip_prefix("type_error:read_property_of_") {
        return format!("TypeError: cannot read properties of {what}");
    }
    if signature.starts_with("type_error") {
        return "Type errors".to_string();
    }
    if let Some(rest) = signature.strip_prefix("reference_error:") {
        let name = rest.strip_suffix("_not_defined").unwrap_or(rest);
        return format!("ReferenceError: {name} is not defined");
    }
    if let Some(rest) = signature.strip_prefix("assertion_failed") {
        return match rest.strip_prefix(':') {
            Some(matcher) if !matcher.is_empty() => format!("Assertion failures ({matcher})"),
            _ => "Assertion failures".to_string(),
        };
    }
    if signature.starts_with("mock_") {
        return "Mock failures".to_string();
    }
    if let Some(rest) = signature.strip_prefix("network_error") {
        return match rest.strip_prefix(':') {
            Some(code) if !code.is_empty() => format!("Network error ({code})"),
            _ => "Network errors".to_string(),
        };
    }
    if signature.starts_with("database_error") {
        return "Database errors".to_string();
    }
    if signature == "browser_launch_failed" {
        return "Browser launch failure".to_string();
    }
    if let Some(command) = signature.strip_prefix("spawn_failed:") {
        return format!("Failed to spawn '{command}'");
    }

    if signature.chars().count() > MAX_TITLE_SIGNATURE_CHARS {
        format!("{}...", truncate_chars(signature, MAX_TITLE_SIGNATURE_CHARS))
    } else {
        signature.to_string()
    }
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// Labels for a new issue: the base labels, the automation marker, and
/// category labels derived from the signature.
pub fn labels(signature: &str, options: &AnalysisOptions) -> BTreeSet<String> {
    let mut labels: BTreeSet<String> = options
        .base_labels
        .iter()
        .filter(|l| !l.trim().is_empty())
        .cloned()
        .collect();
    if !options.filter_label.trim().is_empty() {
        labels.insert(options.filter_label.clone());
    }

    let categories = [
        ("dependencies", signature.contains("missing_module") || signature.contains("spawn_failed")),
        ("type-error", signature.contains("type_error") || signature.contains("reference_error")),
        ("timeout", signature.contains("timeout")),
        ("mocking", signature.contains("mock")),
    ];
    for (label, applies) in categories {
        if applies {
            labels.insert(label.to_string());
        }
    }
    labels
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// Markdown body for a new issue.
pub fn body(group: &FailureGroup, ctx: &AnalysisContext) -> String {
    let report = &ctx.options.report;
    let mut out = String::new();

    let _ = writeln!(out, "## {} Failure Report", ctx.options.test_type);
    out.push('\n');
    write_header(&mut out, group, ctx);
    out.push('\n');
    let _ = writeln!(out, "{}", signature_line(group.signature()));
    out.push('\n');

    out.push_str("### Error\n\n");
    write_code_block(
        &mut out,
        truncate_error(group.representative_message(), report.max_error_chars),
    );
    out.push('\n');

    let files: Vec<String> = group.affected_files().iter().map(|f| format!("`{f}`")).collect();
    if !files.is_empty() {
        out.push_str("### Affected Files\n\n");
        write_capped_list(&mut out, &files, report.max_files);
        out.push('\n');
    }

    out.push_str("### Affected Tests\n\n");
    let tests: Vec<String> = group.affected_tests().iter().map(|t| t.to_string()).collect();
    write_capped_list(&mut out, &tests, report.max_tests_in_body);
    out.push('\n');

    out.push_str("---\n");
    out.push_str(
        "_This issue was created automatically by failtrack. Later failures with the same \
         error signature are added as comments instead of new issues._\n",
    );
    out
}

/// Markdown comment posted on an existing issue when the failure recurs.
pub fn update_comment(group: &FailureGroup, ctx: &AnalysisContext) -> String {
    let mut out = String::new();

    out.push_str("### Failure occurred again\n\n");
    write_header(&mut out, group, ctx);
    out.push('\n');
    let _ = writeln!(out, "{}", signature_line(group.signature()));
    out.push('\n');

    out.push_str("**Affected tests:**\n\n");
    let tests: Vec<String> = group.affected_tests().iter().map(|t| t.to_string()).collect();
    write_capped_list(&mut out, &tests, ctx.options.report.max_tests_in_comment);
    out
}

/// Title, body and labels for a new issue.
pub fn draft(group: &FailureGroup, ctx: &AnalysisContext) -> IssueDraft {
    IssueDraft {
        title: title(group.signature(), group, &ctx.options.test_type),
        body: body(group, ctx),
        labels: labels(group.signature(), &ctx.options),
    }
}

fn write_header(out: &mut String, group: &FailureGroup, ctx: &AnalysisContext) {
    let build: &BuildContext = &ctx.build;
    let _ = writeln!(
        out,
        "**Branch:** {}",
        build.branch.as_deref().unwrap_or("unknown")
    );
    let build_ref = match (&build.build_number, &build.build_url) {
        (Some(number), Some(url)) => format!("[#{number}]({url})"),
        (Some(number), None) => format!("#{number}"),
        (None, Some(url)) => format!("[link]({url})"),
        (None, None) => "unknown".to_string(),
    };
    let _ = writeln!(out, "**Build:** {build_ref}");
    if let Some(job) = &build.job_name {
        let _ = writeln!(out, "**Job:** {job}");
    }
    let _ = writeln!(out, "**Test Type:** {}", ctx.options.test_type);
    let _ = writeln!(out, "**Failures:** {}", group.len());
    let _ = writeln!(out, "**Status:** {}", group.status());
    if let Some(framework) = group.framework() {
        let _ = writeln!(out, "**Framework:** {framework}");
    }
}

fn truncate_error(message: &str, max_chars: usize) -> String {
    let message = message.trim_end();
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    format!("{}\n... (truncated)", truncate_chars(message, max_chars))
}

/// Fenced block whose fence is longer than any backtick run in `text`.
fn write_code_block(out: &mut String, text: String) {
    let longest_run = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run.max(2) + 1);
    let _ = writeln!(out, "{fence}\n{text}\n{fence}");
}

/// Bullet list of at most `max` items, with `...and N more` when cut.
fn write_capped_list(out: &mut String, items: &[String], max: usize) {
    for item in items.iter().take(max) {
        let _ = writeln!(out, "- {item}");
    }
    if items.len() > max {
        let _ = writeln!(out, "- ...and {} more", items.len() - max);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
