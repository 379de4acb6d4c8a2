//! Edit Batcher: merges the edits of every operation in a batch, groups
//! them per file, rejects overlaps and orders them for application.

use crate::edit::Edit;
use crate::error::RefactorError;
use crate::location::{LineIndex, Position};
use crate::ops::OpKind;
use crate::source::SourceCache;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Which operation produced an edit, and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOrigin {
    pub op: usize,
    pub kind: OpKind,
    pub start: Position,
    pub end: Position,
}

impl fmt::Display for EditOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation {} ({}) at {}..{}",
            self.op, self.kind, self.start, self.end
        )
    }
}

/// An edit tagged with the operation that planned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEdit {
    pub op: usize,
    pub kind: OpKind,
    pub edit: Edit,
}

impl PlannedEdit {
    pub fn new(op: usize, kind: OpKind, edit: Edit) -> Self {
        Self { op, kind, edit }
    }

    fn origin(&self, index: &LineIndex<'_>) -> EditOrigin {
        EditOrigin {
            op: self.op,
            kind: self.kind,
            start: index.position(self.edit.byte_start),
            end: index.position(self.edit.byte_end),
        }
    }
}

/// All edits for one file, sorted by descending start offset.
#[derive(Debug, Clone)]
pub struct FileEdits {
    pub path: PathBuf,
    /// Planning snapshot; `None` when the batch creates the file
    pub snapshot: Option<Arc<str>>,
    pub edits: Vec<PlannedEdit>,
}

impl FileEdits {
    pub fn original(&self) -> &str {
        self.snapshot.as_deref().unwrap_or("")
    }

    pub fn is_new(&self) -> bool {
        self.snapshot.is_none()
    }

    /// Apply the edits to the snapshot, bottom-up.
    pub fn render(&self) -> Result<String, RefactorError> {
        Edit::apply_all(self.original(), self.edits.iter().map(|p| &p.edit)).map_err(|source| {
            RefactorError::Edit {
                file: self.path.clone(),
                source,
            }
        })
    }
}

/// Conflict-free edits for a batch, keyed by file.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    files: BTreeMap<PathBuf, FileEdits>,
}

impl EditSet {
    pub fn files(&self) -> impl Iterator<Item = &FileEdits> {
        self.files.values()
    }

    pub fn get(&self, path: &Path) -> Option<&FileEdits> {
        self.files.get(path)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn edit_count(&self) -> usize {
        self.files.values().map(|f| f.edits.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct EditBatcher {
    pending: BTreeMap<PathBuf, Vec<PlannedEdit>>,
}

impl EditBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, planned: PlannedEdit) {
        self.pending
            .entry(planned.edit.file.clone())
            .or_default()
            .push(planned);
    }

    pub fn extend(&mut self, planned: impl IntoIterator<Item = PlannedEdit>) {
        for edit in planned {
            self.push(edit);
        }
    }

    /// Check every file for overlaps and produce the ordered edit set.
    pub fn finish(self, sources: &mut SourceCache) -> Result<EditSet, RefactorError> {
        let mut files = BTreeMap::new();

        for (path, mut edits) in self.pending {
            let snapshot = sources.get(&path)?;
            let text = snapshot.as_deref().unwrap_or("");

            edits.sort_by_key(|p| (p.edit.byte_start, p.edit.byte_end, p.op));
            if let Some((a, b)) = find_overlap(&edits) {
                let index = LineIndex::new(text);
                return Err(RefactorError::EditConflict {
                    file: path,
                    first: edits[a].origin(&index),
                    second: edits[b].origin(&index),
                });
            }
            edits.reverse();

            debug!(file = %path.display(), edits = edits.len(), "batched");
            files.insert(
                path.clone(),
                FileEdits {
                    path,
                    snapshot,
                    edits,
                },
            );
        }

        Ok(EditSet { files })
    }
}

/// Sweep over edits sorted ascending by (start, end). Returns the first
/// conflicting pair.
fn find_overlap(edits: &[PlannedEdit]) -> Option<(usize, usize)> {
    let mut widest: Option<usize> = None;

    for (i, current) in edits.iter().enumerate() {
        if i > 0 {
            let previous = &edits[i - 1];
            if previous.edit.is_insertion()
                && current.edit.is_insertion()
                && previous.edit.byte_start == current.edit.byte_start
            {
                return Some((i - 1, i));
            }
        }

        if let Some(w) = widest {
            if edits[w].edit.overlaps(&current.edit) {
                return Some((w, i));
            }
        }

        if !current.edit.is_insertion()
            && widest.map_or(true, |w| current.edit.byte_end > edits[w].edit.byte_end)
        {
            widest = Some(i);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn planned(
        op: usize,
        file: &Path,
        start: usize,
        end: usize,
        text: &str,
        before: &str,
    ) -> PlannedEdit {
        PlannedEdit::new(
            op,
            OpKind::FindReplace,
            Edit::new(file, start, end, text, before),
        )
    }

    #[test]
    fn test_edits_sorted_descending() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "aaa bbb ccc\n").unwrap();

        let mut batcher = EditBatcher::new();
        batcher.push(planned(0, &file, 0, 3, "A", "aaa"));
        batcher.push(planned(1, &file, 8, 11, "C", "ccc"));
        batcher.push(planned(0, &file, 4, 7, "B", "bbb"));

        let mut sources = SourceCache::new();
        let set = batcher.finish(&mut sources).unwrap();
        let file_edits = set.get(&file).unwrap();
        let starts: Vec<usize> = file_edits.edits.iter().map(|p| p.edit.byte_start).collect();
        assert_eq!(starts, vec![8, 4, 0]);
        assert_eq!(file_edits.render().unwrap(), "A B C\n");
        assert_eq!(set.edit_count(), 3);
    }

    #[test]
    fn test_overlap_names_both_operations() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "count = 1\n").unwrap();

        let mut batcher = EditBatcher::new();
        batcher.push(planned(0, &file, 0, 5, "total", "count"));
        batcher.push(planned(2, &file, 2, 9, "x", "unt = 1"));

        let err = batcher.finish(&mut SourceCache::new()).unwrap_err();
        match err {
            RefactorError::EditConflict { first, second, .. } => {
                assert_eq!(first.op, 0);
                assert_eq!(second.op, 2);
                assert_eq!(first.start, Position::new(1, 1));
                assert_eq!(second.start, Position::new(1, 3));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_adjacent_edits_do_not_conflict() {
        let edits = vec![
            planned(0, Path::new("a"), 0, 3, "", ""),
            planned(1, Path::new("a"), 3, 3, "", ""),
            planned(1, Path::new("a"), 3, 6, "", ""),
        ];
        assert_eq!(find_overlap(&edits), None);
    }

    #[test]
    fn test_insertion_inside_wide_edit_conflicts() {
        let edits = vec![
            planned(0, Path::new("a"), 0, 10, "", ""),
            planned(1, Path::new("a"), 4, 6, "", ""),
        ];
        assert_eq!(find_overlap(&edits), Some((0, 1)));

        let edits = vec![
            planned(0, Path::new("a"), 0, 10, "", ""),
            planned(1, Path::new("a"), 5, 5, "", ""),
        ];
        assert_eq!(find_overlap(&edits), Some((0, 1)));
    }

    #[test]
    fn test_duplicate_insertions_conflict() {
        let edits = vec![
            planned(0, Path::new("a"), 5, 5, "x", ""),
            planned(1, Path::new("a"), 5, 5, "y", ""),
        ];
        assert_eq!(find_overlap(&edits), Some((0, 1)));
    }

    #[test]
    fn test_new_file_renders_from_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("new.py");
        let mut batcher = EditBatcher::new();
        let insert = Edit::insert(&file, 0, "class A:\n    pass\n");
        batcher.push(PlannedEdit::new(0, OpKind::Move, insert));
        let set = batcher.finish(&mut SourceCache::new()).unwrap();
        let edits = set.get(&file).unwrap();
        assert!(edits.is_new());
        assert_eq!(edits.render().unwrap(), "class A:\n    pass\n");
    }
}
