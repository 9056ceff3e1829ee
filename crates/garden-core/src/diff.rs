//! Line diffs between the published and the local text of a note.

use serde::Serialize;
use similar::{ChangeTag, TextDiff};

/// Inserted and deleted line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffStats {
    pub fn between(remote: &str, local: &str) -> Self {
        let remote = normalize_line_endings(remote);
        let local = normalize_line_endings(local);
        let mut stats = DiffStats::default();
        for change in TextDiff::from_lines(&remote, &local).iter_all_changes() {
            match change.tag() {
                ChangeTag::Insert => stats.insertions += 1,
                ChangeTag::Delete => stats.deletions += 1,
                ChangeTag::Equal => {}
            }
        }
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.insertions == 0 && self.deletions == 0
    }
}

/// Unified diff from `remote` to `local`, headed `a/<path>` and `b/<path>`.
///
/// Empty when the texts are equal after line-ending normalisation.
pub fn unified_diff(path: &str, remote: &str, local: &str) -> String {
    let remote = normalize_line_endings(remote);
    let local = normalize_line_endings(local);
    if remote == local {
        return String::new();
    }

    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    TextDiff::from_lines(&remote, &local)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_texts_have_no_diff() {
        assert_eq!(unified_diff("a.md", "x\r\ny\r\n", "x\ny\n"), "");
        assert!(DiffStats::between("x\n", "x\n").is_empty());
    }

    #[test]
    fn unpublished_note_is_all_insertions() {
        let diff = unified_diff("Garden/a.md", "", "one\ntwo\n");
        assert!(diff.starts_with("--- a/Garden/a.md\n+++ b/Garden/a.md\n"));
        assert!(diff.contains("+one\n"));
        assert_eq!(
            DiffStats::between("", "one\ntwo\n"),
            DiffStats {
                insertions: 2,
                deletions: 0
            }
        );
    }

    #[test]
    fn changed_line() {
        let diff = unified_diff("a.md", "title\nold\n", "title\nnew\n");
        assert!(diff.contains("-old\n"));
        assert!(diff.contains("+new\n"));
        assert!(diff.contains(" title\n"));
        let stats = DiffStats::between("title\nold\n", "title\nnew\n");
        assert_eq!((stats.insertions, stats.deletions), (1, 1));
    }
}
