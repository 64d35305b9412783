// crates/core/src/extract.rs
//! Progress-line extraction.

use regex_lite::Regex;

/// A (percent, message) pair pulled out of one line of output.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressMatch {
    pub percent: f64,
    pub message: String,
}

/// Apply a two-capture progress pattern to one line.
///
/// Capture 1 is parsed as a decimal percentage, capture 2 is taken
/// verbatim as the message. Most log lines are not progress lines, so a
/// non-match is the normal case and yields `None`. A structural match
/// whose numeric capture fails to parse (or parses non-finite) is also
/// treated as no match rather than crashing the tracker.
pub fn extract_progress(line: &str, pattern: &Regex) -> Option<ProgressMatch> {
    let captures = pattern.captures(line)?;
    let percent: f64 = captures.get(1)?.as_str().parse().ok()?;
    if !percent.is_finite() {
        return None;
    }
    let message = captures.get(2)?.as_str().to_string();
    Some(ProgressMatch { percent, message })
}
