//! Per-batch source snapshots.
//!
//! Every planner reads files through one cache, so all operations in a
//! batch plan against the same contents and the applier can later check
//! that disk still matches what was planned.

use crate::error::RefactorError;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SourceCache {
    files: BTreeMap<PathBuf, Option<Arc<str>>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of `path`, or `None` when the file does not exist.
    pub fn get(&mut self, path: &Path) -> Result<Option<Arc<str>>, RefactorError> {
        if let Some(cached) = self.files.get(path) {
            return Ok(cached.clone());
        }
        let loaded = match fs::read(path) {
            Ok(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    RefactorError::io(path, std::io::Error::new(ErrorKind::InvalidData, e))
                })?;
                Some(Arc::<str>::from(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(RefactorError::io(path, e)),
        };
        self.files.insert(path.to_path_buf(), loaded.clone());
        Ok(loaded)
    }

    /// Contents of a file that must exist.
    pub fn read(&mut self, path: &Path) -> Result<Arc<str>, RefactorError> {
        self.get(path)?.ok_or_else(|| {
            RefactorError::io(
                path,
                std::io::Error::new(ErrorKind::NotFound, "file does not exist"),
            )
        })
    }
}
