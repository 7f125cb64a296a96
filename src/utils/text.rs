//! Small text helpers shared by the parsers, the signature extractor and
//! the issue generator.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Matches ANSI escape sequences: CSI `\x1b[...X`, OSC `\x1b]...ST`, and
/// two-byte charset switches like `\x1b(B`.
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[A-Za-z]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][A-B0-2]")
        .expect("ANSI regex must compile")
});

/// Remove ANSI colour codes. Test reporters (Jest in particular) embed them
/// in failure messages even when writing JSON.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if text.contains('\x1b') {
        ANSI_RE.replace_all(text, "")
    } else {
        Cow::Borrowed(text)
    }
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Truncate to `max_chars` characters, appending `suffix` when anything was
/// cut. The suffix counts towards the limit.
pub fn truncate_with_suffix(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(suffix.chars().count());
    format!("{}{suffix}", truncate_chars(text, keep))
}

/// First line that is not blank, trimmed.
pub fn first_meaningful_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Remove the common leading indentation from a block of lines and drop
/// blank lines at both ends.
pub fn dedent_block(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(start), Some(end)) = (start, end) else {
        return String::new();
    };
    let block = &lines[start..=end];

    // Measured in chars: indentation may contain multi-byte whitespace.
    let indent = block
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    block
        .iter()
        .map(|l| skip_leading_whitespace(l, indent))
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop up to `count` leading whitespace chars, always cutting on a char
/// boundary.
fn skip_leading_whitespace(line: &str, count: usize) -> &str {
    let cut = line
        .char_indices()
        .take(count)
        .take_while(|(_, c)| c.is_whitespace())
        .last()
        .map_or(0, |(i, c)| i + c.len_utf8());
    &line[cut..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
