//! Error signature extraction.
//!
//! Maps a raw failure message to a short, stable classification key. Many
//! messages collapse onto one signature; the grouper buckets failures by it
//! and the duplicate matcher looks for it verbatim in existing issues.
//!
//! # Rule order
//!
//! [`RULES`] is evaluated top to bottom and the **first** matching rule wins.
//! More specific patterns must therefore precede generic ones: the
//! `mock_not_a_function` rule sits above `not_a_function`, which sits above
//! the bare `TypeError:` catch-all. Categories, in priority order:
//!
//! 1. environment / tooling startup failures
//! 2. type and reference errors
//! 3. assertion-library failures
//! 4. timeouts
//! 5. network connectivity
//! 6. datastores
//!
//! Messages no rule matches fall back to a normalized form of their first
//! line (see [`fallback_signature`]).
//!
//! Everything in this module is pure: no I/O, no logging.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::text::{first_meaningful_line, strip_ansi, truncate_chars};

/// Maximum length of any signature, in characters.
pub const MAX_SIGNATURE_CHARS: usize = 100;

/// Signature used when a message is empty or normalizes to nothing.
pub const UNKNOWN_SIGNATURE: &str = "unknown_error";

/// A single classification rule.
#[derive(Debug, Clone, Copy)]
pub struct SignatureRule {
    /// Stable rule identifier, shown by `failtrack classify`.
    pub name: &'static str,
    /// Regex evaluated against the ANSI-stripped message.
    pub pattern: &'static str,
    /// Output template; `${1}` etc. expand to capture groups.
    pub template: &'static str,
}

const fn rule(name: &'static str, pattern: &'static str, template: &'static str) -> SignatureRule {
    SignatureRule {
        name,
        pattern,
        template,
    }
}

/// The ordered classification table. Earlier rules take precedence.
pub const RULES: &[SignatureRule] = &[
    // -- environment / tooling ---------------------------------------------
    rule(
        "missing_module",
        r#"Cannot find module ['"]([^'"]+)['"]"#,
        "missing_module:${1}",
    ),
    rule(
        "missing_python_module",
        r"No module named '([^']+)'",
        "missing_module:${1}",
    ),
    rule(
        "browser_launch",
        r"(?i)browserType\.launch|failed to launch (?:the )?(?:browser|chrome|chromium)|Executable doesn't exist at",
        "browser_launch_failed",
    ),
    rule("spawn_enoent", r"spawn (\S+) ENOENT", "spawn_failed:${1}"),
    rule(
        "esm_import",
        r"SyntaxError: Cannot use import statement outside a module",
        "syntax_error:esm_import",
    ),
    rule(
        "mock_not_a_function",
        r"TypeError: (?:\S+\.)?(mock\w*) is not a function",
        "mock_error:${1}",
    ),
    // -- type / reference errors -------------------------------------------
    rule(
        "not_a_function",
        r"TypeError: .*\bis not a function",
        "type_error:not_a_function",
    ),
    rule(
        "read_property",
        r"TypeError: Cannot read propert(?:y|ies) of (undefined|null)",
        "type_error:read_property_of_${1}",
    ),
    rule(
        "not_a_constructor",
        r"TypeError: .*\bis not a constructor",
        "type_error:not_a_constructor",
    ),
    rule(
        "not_iterable",
        r"TypeError: .*\bis not iterable",
        "type_error:not_iterable",
    ),
    rule(
        "reference_error",
        r"ReferenceError: (\w+) is not defined",
        "reference_error:${1}_not_defined",
    ),
    rule("type_error", r"TypeError:", "type_error:other"),
    // -- assertion libraries -----------------------------------------------
    rule(
        "mock_matcher",
        r"expect\((?:jest\.fn\(\)|vi\.fn\(\)|[^)]*)\)\.(?:not\.)?((?:toHaveBeenCalled|toBeCalled|toHaveReturned)\w*)",
        "mock_assertion:${1}",
    ),
    rule(
        "jest_matcher",
        r"expect\([^)]*\)\.(?:(?:not|resolves|rejects)\.)*(to\w+)\(",
        "assertion_failed:${1}",
    ),
    rule("assertion_error", r"AssertionError", "assertion_failed:assert"),
    rule(
        "assertion_generic",
        r"(?i)\bassertion\b.{0,80}\bfailed\b",
        "assertion_failed",
    ),
    // -- timeouts ----------------------------------------------------------
    rule(
        "jest_timeout",
        r"(?i)exceeded timeout of \d+\s*ms",
        "timeout_error",
    ),
    rule(
        "mocha_timeout",
        r"(?i)timeout of \d+\s*ms exceeded",
        "timeout_error",
    ),
    rule(
        "locator_wait",
        r"(?i)waiting for locator",
        "timeout_error:locator",
    ),
    rule(
        "selector_wait",
        r"(?i)waiting for selector",
        "timeout_error:selector",
    ),
    rule(
        "generic_timeout",
        r"(?i)\btimeout\b|\btimed out\b|TimeoutError",
        "timeout_error",
    ),
    // -- network -----------------------------------------------------------
    rule(
        "errno",
        r"\b(ECONNREFUSED|ECONNRESET|ENOTFOUND|ETIMEDOUT|EAI_AGAIN|EPIPE)\b",
        "network_error:${1}",
    ),
    rule("chromium_net", r"net::ERR_([A-Z_]+)", "network_error:${1}"),
    rule(
        "socket_hang_up",
        r"(?i)socket hang up",
        "network_error:socket_hang_up",
    ),
    rule(
        "fetch_failed",
        r"(?i)\bfetch failed\b|NetworkError when attempting to fetch",
        "network_error:fetch_failed",
    ),
    // -- datastores --------------------------------------------------------
    rule(
        "mongo",
        r"\bMongo(?:Server|Network|Parse)?Error\b|MongooseServerSelectionError",
        "database_error:mongo",
    ),
    rule(
        "missing_relation",
        r#"relation "([^"]+)" does not exist"#,
        "database_error:missing_relation:${1}",
    ),
    rule(
        "orm_query",
        r"\b(?:SequelizeDatabaseError|QueryFailedError|PrismaClient\w*Error)\b",
        "database_error:query",
    ),
    rule(
        "deadlock",
        r"(?i)deadlock detected",
        "database_error:deadlock",
    ),
    rule("redis", r"\b(?:ReplyError|RedisError)\b", "database_error:redis"),
];

static COMPILED: LazyLock<Vec<(SignatureRule, Regex)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|r| {
            let regex = Regex::new(r.pattern).expect("signature rule must compile");
            (*r, regex)
        })
        .collect()
});

// ---------------------------------------------------------------------------
// Fallback normalization
// ---------------------------------------------------------------------------

/// `at fn (file:line:col)` and `at /abs/file:line:col` stack frames.
static STACK_FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+at\s+(?:\S+\s+)?\([^)]*\)|\s+at\s+(?:file://|node:|/|[A-Za-z]:\\)\S*")
        .expect("stack frame regex must compile")
});

/// Absolute POSIX or Windows paths. The leading group keeps the delimiter
/// in front of the path.
static ABS_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(^|[\s('"`=])(?:[A-Za-z]:\\|/)(?:[\w.@-]+[/\\])+[\w.@-]*(?::\d+)*"#)
        .expect("path regex must compile")
});

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit regex must compile"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex must compile"));

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute the error signature of a failure message.
///
/// Never returns an empty string and never exceeds
/// [`MAX_SIGNATURE_CHARS`] characters.
pub fn extract(message: &str) -> String {
    let clean = strip_ansi(message);
    if clean.trim().is_empty() {
        return UNKNOWN_SIGNATURE.to_string();
    }

    for (rule, regex) in COMPILED.iter() {
        if let Some(caps) = regex.captures(&clean) {
            let mut out = String::new();
            caps.expand(rule.template, &mut out);
            let out = truncate_chars(out.trim(), MAX_SIGNATURE_CHARS);
            if !out.is_empty() {
                return out.to_string();
            }
        }
    }

    fallback_signature(&clean)
}

/// Name of the rule that classifies `message`, or `None` when the fallback
/// would be used.
pub fn rule_for(message: &str) -> Option<&'static str> {
    let clean = strip_ansi(message);
    if clean.trim().is_empty() {
        return None;
    }
    COMPILED
        .iter()
        .find(|(_, regex)| regex.is_match(&clean))
        .map(|(rule, _)| rule.name)
}

/// Normalize the first line of a message into a signature.
///
/// Strips stack frames and absolute paths, replaces digit runs with `#`,
/// collapses whitespace and truncates. Yields [`UNKNOWN_SIGNATURE`] when
/// nothing is left.
pub fn fallback_signature(message: &str) -> String {
    let Some(line) = first_meaningful_line(message) else {
        return UNKNOWN_SIGNATURE.to_string();
    };

    let line = STACK_FRAME_RE.replace_all(line, "");
    let line = ABS_PATH_RE.replace_all(&line, "${1}");
    let line = DIGITS_RE.replace_all(&line, "#");
    let line = WHITESPACE_RE.replace_all(&line, " ");
    let line = truncate_chars(line.trim(), MAX_SIGNATURE_CHARS).trim_end();

    if line.is_empty() {
        UNKNOWN_SIGNATURE.to_string()
    } else {
        line.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
