//! Atomic Applier: commits an [`EditSet`] to disk all-or-nothing.
//!
//! Every file is rendered and validated before the first write. Writes go
//! through [`atomic_write`], and a failure part-way restores each file
//! already written from its planning snapshot.

use crate::batch::{EditSet, FileEdits};
use crate::edit::atomic_write;
use crate::error::RefactorError;
use crate::report::{FileOutcome, FileStatus};
use crate::safety::WorkspaceGuard;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// One commit lock per canonical workspace root, shared by every
/// applier in the process.
static WORKSPACE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

fn workspace_lock(root: &Path) -> Arc<Mutex<()>> {
    let locks = WORKSPACE_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    locks
        .lock()
        .entry(root.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// A rendered file waiting to be written.
struct Staged<'a> {
    file: &'a FileEdits,
    target: PathBuf,
    content: String,
}

/// What was written so far, for rollback.
enum Written {
    Replaced {
        path: PathBuf,
        original: Arc<str>,
    },
    /// `dirs` lists the parent directories the write created, deepest first
    Created { path: PathBuf, dirs: Vec<PathBuf> },
}

pub struct AtomicApplier<'g> {
    guard: &'g WorkspaceGuard,
}

impl<'g> AtomicApplier<'g> {
    pub fn new(guard: &'g WorkspaceGuard) -> Self {
        Self { guard }
    }

    /// Write every file of `set`, or none of them.
    ///
    /// Holds the workspace commit lock for the whole call, so two batches
    /// against one root never interleave their writes.
    pub fn commit(&self, set: &EditSet) -> Result<Vec<FileOutcome>, RefactorError> {
        let lock = workspace_lock(self.guard.workspace_root());
        let _held = lock.lock();

        let staged = self.stage(set)?;
        let mut written: Vec<Written> = Vec::new();
        let mut outcomes = Vec::with_capacity(staged.len());

        for item in &staged {
            match self.write_one(item) {
                Ok(Some(entry)) => {
                    let status = match entry {
                        Written::Created { .. } => FileStatus::Created,
                        Written::Replaced { .. } => FileStatus::Written,
                    };
                    debug!(file = %item.target.display(), %status, "wrote");
                    written.push(entry);
                    outcomes.push(FileOutcome {
                        path: item.file.path.clone(),
                        status,
                        edits: item.file.edits.len(),
                    });
                }
                Ok(None) => outcomes.push(FileOutcome {
                    path: item.file.path.clone(),
                    status: FileStatus::Unchanged,
                    edits: item.file.edits.len(),
                }),
                Err(reason) => {
                    warn!(file = %item.target.display(), %reason, "write failed, rolling back");
                    return Err(rollback(item.file.path.clone(), reason, written));
                }
            }
        }

        info!(
            files = outcomes.len(),
            edits = set.edit_count(),
            "batch committed"
        );
        Ok(outcomes)
    }

    /// Render and validate every file up front.
    fn stage<'s>(&self, set: &'s EditSet) -> Result<Vec<Staged<'s>>, RefactorError> {
        set.files()
            .map(|file| -> Result<Staged<'s>, RefactorError> {
                let target = if file.is_new() {
                    self.guard.validate_new_path(&file.path)?
                } else {
                    self.guard.validate_path(&file.path)?
                };
                let content = file.render()?;
                Ok(Staged {
                    file,
                    target,
                    content,
                })
            })
            .collect()
    }

    /// `Ok(None)` when the rendered content equals the snapshot.
    fn write_one(&self, item: &Staged<'_>) -> Result<Option<Written>, String> {
        let target = self
            .guard
            .revalidate(&item.target)
            .map_err(|e| e.to_string())?;
        check_unchanged(&target, item.file)?;

        if !item.file.is_new() && item.content == item.file.original() {
            return Ok(None);
        }

        let dirs = missing_dirs(&target);
        atomic_write(&target, item.content.as_bytes()).map_err(|e| e.to_string())?;
        Ok(Some(match &item.file.snapshot {
            Some(original) => Written::Replaced {
                path: target,
                original: Arc::clone(original),
            },
            None => Written::Created { path: target, dirs },
        }))
    }
}

/// Ancestors of `path` that do not exist yet, deepest first.
fn missing_dirs(path: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .skip(1)
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Disk must still hold what the batch was planned against.
fn check_unchanged(path: &Path, file: &FileEdits) -> Result<(), String> {
    match (&file.snapshot, fs::read(path)) {
        (Some(snapshot), Ok(current)) => {
            if xxh3_64(&current) == xxh3_64(snapshot.as_bytes()) {
                Ok(())
            } else {
                Err("file changed on disk since planning".to_string())
            }
        }
        (Some(_), Err(e)) if e.kind() == ErrorKind::NotFound => {
            Err("file was removed since planning".to_string())
        }
        (None, Ok(_)) => Err("file was created since planning".to_string()),
        (None, Err(e)) if e.kind() == ErrorKind::NotFound => Ok(()),
        (_, Err(e)) => Err(e.to_string()),
    }
}

/// Undo `written` newest first and build the failure report.
fn rollback(file: PathBuf, reason: String, written: Vec<Written>) -> RefactorError {
    let mut restored = Vec::new();
    let mut unrestored = Vec::new();

    for entry in written.into_iter().rev() {
        match entry {
            Written::Replaced { path, original } => {
                match atomic_write(&path, original.as_bytes()) {
                    Ok(()) => restored.push(path),
                    Err(e) => {
                        error!(file = %path.display(), error = %e, "restore failed");
                        unrestored.push(path);
                    }
                }
            }
            Written::Created { path, dirs } => {
                match fs::remove_file(&path) {
                    Ok(()) => restored.push(path),
                    Err(e) => {
                        error!(file = %path.display(), error = %e, "removing created file failed");
                        unrestored.push(path);
                        continue;
                    }
                }
                for dir in dirs {
                    if let Err(e) = fs::remove_dir(&dir) {
                        error!(dir = %dir.display(), error = %e, "removing created dir failed");
                        unrestored.push(dir);
                        break;
                    }
                }
            }
        }
    }

    RefactorError::PartialWriteFailure {
        file,
        reason,
        restored,
        unrestored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{EditBatcher, PlannedEdit};
    use crate::edit::Edit;
    use crate::ops::OpKind;
    use crate::source::SourceCache;

    fn edit_set(edits: Vec<Edit>) -> EditSet {
        let mut batcher = EditBatcher::new();
        batcher.extend(
            edits
                .into_iter()
                .map(|e| PlannedEdit::new(0, OpKind::FindReplace, e)),
        );
        batcher.finish(&mut SourceCache::new()).unwrap()
    }

    #[test]
    fn test_commit_writes_and_creates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a.py");
        let b = root.join("pkg/b.py");
        fs::write(&a, "count = 1\n").unwrap();

        let set = edit_set(vec![
            Edit::new(&a, 0, 5, "total", "count"),
            Edit::insert(&b, 0, "x = 2\n"),
        ]);
        let guard = WorkspaceGuard::new(&root).unwrap();
        let outcomes = AtomicApplier::new(&guard).commit(&set).unwrap();

        assert_eq!(fs::read_to_string(&a).unwrap(), "total = 1\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "x = 2\n");
        let statuses: Vec<FileStatus> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![FileStatus::Written, FileStatus::Created]);
    }

    #[test]
    fn test_identity_edit_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a.py");
        fs::write(&a, "x = 1\n").unwrap();

        let set = edit_set(vec![Edit::new(&a, 0, 1, "x", "x")]);
        let guard = WorkspaceGuard::new(&root).unwrap();
        let outcomes = AtomicApplier::new(&guard).commit(&set).unwrap();
        assert_eq!(outcomes[0].status, FileStatus::Unchanged);
    }

    #[test]
    fn test_external_change_rolls_back_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a.py");
        let b = root.join("b.py");
        let c = root.join("c.py");
        fs::write(&a, "one\n").unwrap();
        fs::write(&b, "two\n").unwrap();

        let set = edit_set(vec![
            Edit::new(&a, 0, 3, "ONE", "one"),
            Edit::new(&b, 0, 3, "TWO", "two"),
            Edit::insert(&c, 0, "three\n"),
        ]);
        // c.py appears after planning
        fs::write(&c, "surprise\n").unwrap();

        let guard = WorkspaceGuard::new(&root).unwrap();
        let err = AtomicApplier::new(&guard).commit(&set).unwrap_err();
        match err {
            RefactorError::PartialWriteFailure {
                file,
                restored,
                unrestored,
                ..
            } => {
                assert_eq!(file, c);
                assert_eq!(restored.len(), 2);
                assert!(unrestored.is_empty());
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(fs::read_to_string(&a).unwrap(), "one\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "two\n");
        assert_eq!(fs::read_to_string(&c).unwrap(), "surprise\n");
    }

    #[test]
    fn test_rollback_removes_created_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a.py");
        let created = root.join("new/deep/b.py");
        let late = root.join("z.py");
        fs::write(&a, "one\n").unwrap();

        let set = edit_set(vec![
            Edit::new(&a, 0, 3, "ONE", "one"),
            Edit::insert(&created, 0, "b = 1\n"),
            Edit::insert(&late, 0, "z = 1\n"),
        ]);
        fs::write(&late, "surprise\n").unwrap();

        let guard = WorkspaceGuard::new(&root).unwrap();
        let err = AtomicApplier::new(&guard).commit(&set).unwrap_err();
        assert!(matches!(
            err,
            RefactorError::PartialWriteFailure { ref unrestored, .. } if unrestored.is_empty()
        ));
        assert_eq!(fs::read_to_string(&a).unwrap(), "one\n");
        assert!(!root.join("new").exists());
    }

    #[test]
    fn test_missing_dirs_deepest_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(
            missing_dirs(&root.join("x/y/f.py")),
            vec![root.join("x/y"), root.join("x")]
        );
        assert!(missing_dirs(&root.join("f.py")).is_empty());
    }

    #[test]
    fn test_workspace_lock_is_shared_per_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let other = root.join("other");

        let lock = workspace_lock(&root);
        assert!(Arc::ptr_eq(&lock, &workspace_lock(&root)));

        let _held = lock.lock();
        assert!(workspace_lock(&root).try_lock().is_none());
        assert!(workspace_lock(&other).try_lock().is_some());
    }

    #[test]
    fn test_concurrent_commits_on_one_root_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let a = root.join("a.py");
        fs::write(&a, "v0\n").unwrap();

        // Both batches are planned against the same snapshot
        let sets = [
            edit_set(vec![Edit::new(&a, 0, 2, "v1", "v0")]),
            edit_set(vec![Edit::new(&a, 0, 2, "v2", "v0")]),
        ];
        let guard = WorkspaceGuard::new(&root).unwrap();
        let barrier = std::sync::Barrier::new(2);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = sets
                .iter()
                .map(|set| {
                    let (guard, barrier) = (&guard, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        AtomicApplier::new(guard).commit(set)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let won: Vec<usize> = (0..2).filter(|&i| results[i].is_ok()).collect();
        assert_eq!(won.len(), 1);
        let loser = &results[1 - won[0]];
        assert!(matches!(loser, Err(RefactorError::PartialWriteFailure { .. })));
        let expected = if won[0] == 0 { "v1\n" } else { "v2\n" };
        assert_eq!(fs::read_to_string(&a).unwrap(), expected);
    }

    #[test]
    fn test_path_outside_workspace_fails_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();
        let inside = root.join("a.py");
        let outside = dir.path().canonicalize().unwrap().join("b.py");
        fs::write(&inside, "a\n").unwrap();
        fs::write(&outside, "b\n").unwrap();

        let set = edit_set(vec![
            Edit::new(&inside, 0, 1, "A", "a"),
            Edit::new(&outside, 0, 1, "B", "b"),
        ]);
        let guard = WorkspaceGuard::new(&root).unwrap();
        let err = AtomicApplier::new(&guard).commit(&set).unwrap_err();
        assert!(matches!(err, RefactorError::Workspace(_)));
        assert_eq!(fs::read_to_string(&inside).unwrap(), "a\n");
    }
}
