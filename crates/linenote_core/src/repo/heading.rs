//! Heading predicates.
//!
//! # Invariants
//! - Only `is_category_heading` decides category storage. It accepts exactly
//!   one leading `#` followed by whitespace and non-empty text.
//! - `is_markdown_heading` accepts `#` through `######` and is display-only.

use crate::model::line::LineKind;
use once_cell::sync::Lazy;
use regex::Regex;

// A single `#` must be followed by whitespace, so `##` can never match.
static CATEGORY_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\s+.+").expect("valid category heading regex"));
static MARKDOWN_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+)").expect("valid markdown heading regex"));

/// Returns whether `text` is stored as a category row.
pub fn is_category_heading(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && CATEGORY_HEADING_RE.is_match(trimmed)
}

/// Returns whether `text` renders as a markdown heading of any level.
pub fn is_markdown_heading(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && MARKDOWN_HEADING_RE.is_match(trimmed)
}

/// Heading depth (1..=6) for display, `None` for non-headings.
pub fn markdown_heading_level(text: &str) -> Option<u8> {
    MARKDOWN_HEADING_RE
        .captures(text.trim())
        .map(|captures| captures[1].len() as u8)
}

/// Heading text without markers. Non-headings are returned unchanged.
pub fn extract_heading_text(text: &str) -> String {
    match MARKDOWN_HEADING_RE.captures(text.trim()) {
        Some(captures) => captures[2].trim().to_string(),
        None => text.to_string(),
    }
}

/// Classifies free text into the line state machine.
pub fn classify_line(text: &str) -> LineKind {
    if is_category_heading(text) {
        LineKind::CategoryHeading { level: 1 }
    } else {
        LineKind::PlainText
    }
}

#[cfg(test)]
mod tests {
    use super::{
        classify_line, extract_heading_text, is_category_heading, is_markdown_heading,
        markdown_heading_level,
    };
    use crate::model::line::LineKind;

    #[test]
    fn category_heading_requires_single_hash_space_and_text() {
        assert!(is_category_heading("# Chapter 1"));
        assert!(is_category_heading("  #\tTabbed  "));
        assert!(!is_category_heading("## Section"));
        assert!(!is_category_heading("#NoSpace"));
        assert!(!is_category_heading("# "));
        assert!(!is_category_heading("#"));
        assert!(!is_category_heading(""));
        assert!(!is_category_heading("text # not"));
    }

    #[test]
    fn markdown_heading_accepts_one_to_six_levels() {
        assert!(is_markdown_heading("# a"));
        assert!(is_markdown_heading("###### f"));
        assert!(!is_markdown_heading("####### g"));
        assert_eq!(markdown_heading_level("### c"), Some(3));
        assert_eq!(markdown_heading_level("plain"), None);
    }

    #[test]
    fn extract_heading_text_strips_markers() {
        assert_eq!(extract_heading_text("#  Title "), "Title");
        assert_eq!(extract_heading_text("## Sub"), "Sub");
        assert_eq!(extract_heading_text("plain"), "plain");
    }

    #[test]
    fn classify_line_maps_to_kind() {
        assert_eq!(
            classify_line("# Top"),
            LineKind::CategoryHeading { level: 1 }
        );
        assert_eq!(classify_line("## Deeper"), LineKind::PlainText);
    }
}
