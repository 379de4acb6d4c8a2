//! Path Mapper: expands short logical names to file paths.
//!
//! A pure lookup table passed with each batch. Relative results resolve
//! against the workspace root.

use crate::error::RefactorError;
use crate::suggest;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMap {
    entries: BTreeMap<String, PathBuf>,
}

impl PathMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.insert(name.into(), path.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Resolve `name` to a path under `root`.
    ///
    /// Mapped names win. Anything that already looks like a path
    /// (absolute, containing a separator, or carrying an extension) passes
    /// through. A bare token that is not mapped is accepted only when the
    /// map is empty or the token names an existing file; otherwise it is
    /// an [`RefactorError::UnknownShortName`].
    pub fn resolve(&self, name: &Path, root: &Path) -> Result<PathBuf, RefactorError> {
        if let Some(mapped) = name.to_str().and_then(|key| self.entries.get(key)) {
            return Ok(absolutize(mapped, root));
        }

        let looks_like_path = name.is_absolute()
            || name.components().count() > 1
            || name.extension().is_some();
        if looks_like_path || self.entries.is_empty() {
            return Ok(absolutize(name, root));
        }

        let candidate = absolutize(name, root);
        if candidate.is_file() {
            return Ok(candidate);
        }

        let key = name.to_string_lossy().into_owned();
        let suggestion =
            suggest::closest(&key, self.entries.keys().map(String::as_str)).map(str::to_string);
        Err(RefactorError::UnknownShortName {
            name: key,
            suggestion,
        })
    }
}

impl FromIterator<(String, PathBuf)> for PathMap {
    fn from_iter<I: IntoIterator<Item = (String, PathBuf)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Joins onto `root` and drops `.` components so `./a.py` and `a.py`
/// produce the same key.
fn absolutize(path: &Path, root: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    joined.components().collect()
}
