//! What each phase hands back. Everything here is `Serialize` so the CLI
//! can emit it as JSON.

use crate::batch::FileEdits;
use crate::ops::{OpKind, OpStats};
use serde::Serialize;
use similar::TextDiff;
use std::fmt;
use std::path::{Path, PathBuf};

/// Counts only; nothing on disk changes.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub operations: Vec<OpStats>,
    pub total_edits: usize,
    pub total_files: usize,
}

/// Full diffs; nothing on disk changes.
#[derive(Debug, Clone, Serialize)]
pub struct ChangesReport {
    pub operations: Vec<OpStats>,
    pub files: Vec<FileDiff>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub created: bool,
    pub edits: usize,
    /// Unified diff of the snapshot against the rendered content
    pub diff: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub operations: Vec<OpStats>,
    pub files: Vec<FileOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Written,
    Created,
    /// The edits reproduced the existing content
    Unchanged,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileStatus::Written => "written",
            FileStatus::Created => "created",
            FileStatus::Unchanged => "unchanged",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
    pub edits: usize,
}

/// Result of [`crate::Refactorer::run`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseReport {
    Preview(PreviewReport),
    Changes(ChangesReport),
    Apply(ApplyReport),
}

impl PhaseReport {
    pub fn operations(&self) -> &[OpStats] {
        match self {
            PhaseReport::Preview(r) => &r.operations,
            PhaseReport::Changes(r) => &r.operations,
            PhaseReport::Apply(r) => &r.operations,
        }
    }
}

impl ApplyReport {
    pub fn edit_count(&self) -> usize {
        self.files.iter().map(|f| f.edits).sum()
    }
}

impl FileDiff {
    pub(crate) fn render(file: &FileEdits, modified: &str, context: usize, root: &Path) -> Self {
        let shown = file.path.strip_prefix(root).unwrap_or(&file.path);
        let old_header = if file.is_new() {
            "/dev/null".to_string()
        } else {
            format!("a/{}", shown.display())
        };
        let new_header = format!("b/{}", shown.display());
        let diff = TextDiff::from_lines(file.original(), modified)
            .unified_diff()
            .context_radius(context)
            .header(&old_header, &new_header)
            .to_string();
        Self {
            path: file.path.clone(),
            created: file.is_new(),
            edits: file.edits.len(),
            diff,
        }
    }
}

fn noun(kind: OpKind) -> (&'static str, &'static str) {
    match kind {
        OpKind::Rename | OpKind::RenameLocal => ("reference", "references"),
        OpKind::FindReplace => ("match", "matches"),
        OpKind::ToggleComment => ("line", "lines"),
        OpKind::CopyPaste => ("insertion", "insertions"),
        OpKind::Move | OpKind::ChangeSignature => ("edit", "edits"),
    }
}

fn counted(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// One-line summary, e.g. `3 references in 1 file`.
pub fn summary_line(stats: &OpStats) -> String {
    let (singular, plural) = noun(stats.kind);
    let mut line = format!(
        "{} in {}",
        counted(stats.edits, singular, plural),
        counted(stats.files, "file", "files")
    );
    if stats.matched < stats.found {
        let filtered = stats.found - stats.matched;
        line.push_str(&format!(" ({filtered} filtered out of {})", stats.found));
    }
    line
}

impl fmt::Display for OpStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.index,
            self.kind,
            self.description,
            summary_line(self)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(kind: OpKind, found: usize, matched: usize, edits: usize, files: usize) -> OpStats {
        OpStats {
            index: 0,
            kind,
            description: "a.py:10:5 -> total".to_string(),
            found,
            matched,
            edits,
            files,
        }
    }

    #[test]
    fn test_summary_line_wording() {
        assert_eq!(
            summary_line(&stats(OpKind::Rename, 3, 3, 3, 1)),
            "3 references in 1 file"
        );
        assert_eq!(
            summary_line(&stats(OpKind::FindReplace, 5, 2, 2, 2)),
            "2 matches in 2 files (3 filtered out of 5)"
        );
        assert_eq!(
            summary_line(&stats(OpKind::ToggleComment, 1, 1, 1, 1)),
            "1 line in 1 file"
        );
    }

    #[test]
    fn test_display_includes_kind_and_index() {
        let line = stats(OpKind::Rename, 3, 3, 3, 1).to_string();
        assert_eq!(line, "[0] rename a.py:10:5 -> total: 3 references in 1 file");
    }
}
