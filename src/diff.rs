//! Line diffs between stored and proposed record text.

use similar::{ChangeTag, TextDiff};
use std::fmt::Write as _;

/// Renders a `- stored` / `+ proposed` line diff.
///
/// An absent baseline renders every proposed line as an insertion.
pub fn render_record_diff(label: &str, stored: Option<&str>, proposed: &str) -> String {
    let stored = stored.unwrap_or("");
    let mut out = String::new();
    let _ = writeln!(out, "--- {label} (stored)");
    let _ = writeln!(out, "+++ {label} (attempted)");

    let diff = TextDiff::from_lines(stored, proposed);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Equal => ' ',
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
        };
        let line = change.value();
        let line = line.strip_suffix('\n').unwrap_or(line);
        let _ = writeln!(out, "{sign} {line}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_changed_lines() {
        let diff = render_record_diff("div-001.json", Some("a\nb\n"), "a\nc\n");
        assert!(diff.starts_with("--- div-001.json (stored)\n+++ div-001.json (attempted)\n"));
        assert!(diff.contains("  a\n"));
        assert!(diff.contains("- b\n"));
        assert!(diff.contains("+ c\n"));
    }

    #[test]
    fn absent_baseline_is_all_insertions() {
        let diff = render_record_diff("x", None, "one\ntwo\n");
        assert!(diff.contains("+ one\n"));
        assert!(diff.contains("+ two\n"));
        assert!(!diff.contains("- "));
    }
}
