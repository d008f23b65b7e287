//! Deterministic `why` extraction over commit messages, used when
//! building a project's timeline.

use regex::Regex;
use std::sync::OnceLock;

fn adr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ADR-\d+").unwrap())
}

fn issue_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(#\d+\)").unwrap())
}

/// Any trimmed line beginning with `Why:`, `Reason:`, `Fixes #`,
/// `Closes #`, `Refs #`, `References:`, or matching `ADR-\d+` /
/// `(#\d+)`; falls back to the commit's first line.
pub fn extract_why(message: &str) -> String {
    for line in message.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let starts_with_marker = trimmed.starts_with("Why:")
            || trimmed.starts_with("Reason:")
            || trimmed.starts_with("Fixes #")
            || trimmed.starts_with("Closes #")
            || trimmed.starts_with("Refs #")
            || trimmed.starts_with("References:");
        if starts_with_marker || adr_re().is_match(trimmed) || issue_ref_re().is_match(trimmed) {
            return trimmed.to_string();
        }
    }

    message.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_why_marker() {
        assert_eq!(extract_why("fix bug\n\nWhy: it crashed in prod"), "Why: it crashed in prod");
    }

    #[test]
    fn matches_fixes_hash() {
        assert_eq!(extract_why("patch\nFixes #42"), "Fixes #42");
    }

    #[test]
    fn matches_adr_reference() {
        assert_eq!(extract_why("rework caching per ADR-7"), "rework caching per ADR-7");
    }

    #[test]
    fn matches_trailing_issue_ref() {
        assert_eq!(extract_why("tidy up logging (#123)"), "tidy up logging (#123)");
    }

    #[test]
    fn falls_back_to_first_line() {
        assert_eq!(extract_why("short summary\nsecond line"), "short summary");
    }
}
