//! Post-processing: deterministic normalisation of converter output.
//!
//! Every successful dispatch runs exactly these rules, in this order, on the
//! converter's Markdown before it is returned:
//!
//! 1. Trim trailing whitespace from every line (CRLF and LF both split lines)
//! 2. Collapse runs of two or more blank lines into a single blank line
//!
//! The pass is idempotent: normalising already-normalised text is a no-op.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to a converter's Markdown.
pub fn normalise_markdown(input: &str) -> String {
    let s = trim_trailing_whitespace(input);
    collapse_blank_lines(&s)
}

// ── Rule 1: Trim trailing whitespace per line ────────────────────────────────

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n").unwrap());

fn trim_trailing_whitespace(input: &str) -> String {
    RE_LINE_BREAK
        .split(input)
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 2: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}
