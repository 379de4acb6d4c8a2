use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: byte-span replacement with verification.
///
/// Every planner compiles its intent down to this primitive. Edits are
/// planned against a snapshot of the file and verified against the same
/// snapshot when the batch is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until it is rendered into an edit set"]
pub struct Edit {
    /// Path to the file to edit (absolute)
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    /// New text to insert at [byte_start, byte_end)
    pub new_text: String,
    /// Verification of what we expect to find before applying
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Before-text verification failed at {file}:{byte_start}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
        found: String,
    },

    #[error("Invalid byte range: [{byte_start}, {byte_end}) in file of length {file_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("Invalid edit would split a UTF-8 character at {file}:{offset}")]
    InvalidUtf8Edit { file: PathBuf, offset: usize },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Edit {
    /// Create a new edit with automatic verification generation.
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: impl AsRef<str>,
    ) -> Self {
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before.as_ref()),
        }
    }

    /// Zero-width insertion at `offset`.
    pub fn insert(file: impl Into<PathBuf>, offset: usize, text: impl Into<String>) -> Self {
        Self::new(file, offset, offset, text, "")
    }

    /// Replace `[byte_start, byte_end)` of `content`, capturing the
    /// current text as the expected before-text.
    pub fn replace_in(
        file: impl Into<PathBuf>,
        content: &str,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
    ) -> Self {
        Self::new(
            file,
            byte_start,
            byte_end,
            new_text,
            &content[byte_start..byte_end],
        )
    }

    pub fn is_insertion(&self) -> bool {
        self.byte_start == self.byte_end
    }

    /// Two edits conflict when their spans intersect. A zero-width
    /// insertion conflicts with another insertion at the same offset and
    /// with any edit that strictly contains its offset.
    pub fn overlaps(&self, other: &Edit) -> bool {
        match (self.is_insertion(), other.is_insertion()) {
            (true, true) => self.byte_start == other.byte_start,
            (true, false) => {
                other.byte_start < self.byte_start && self.byte_start < other.byte_end
            }
            (false, true) => {
                self.byte_start < other.byte_start && other.byte_start < self.byte_end
            }
            (false, false) => {
                self.byte_start < other.byte_end && other.byte_start < self.byte_end
            }
        }
    }

    /// Validate the edit against the snapshot it was planned from.
    fn validate(&self, content: &str) -> Result<(), EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                file_len: content.len(),
            });
        }

        for offset in [self.byte_start, self.byte_end] {
            if !content.is_char_boundary(offset) {
                return Err(EditError::InvalidUtf8Edit {
                    file: self.file.clone(),
                    offset,
                });
            }
        }

        let current_text = &content[self.byte_start..self.byte_end];
        if !self.expected_before.matches(current_text) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                found: current_text.to_string(),
            });
        }

        Ok(())
    }

    /// Apply edits for one file to its snapshot text.
    ///
    /// Edits must be sorted by byte_start descending and must not overlap;
    /// they are applied bottom-to-top to avoid offset invalidation.
    pub fn apply_all<'e>(
        content: &str,
        edits: impl IntoIterator<Item = &'e Edit>,
    ) -> Result<String, EditError> {
        let edits: Vec<&Edit> = edits.into_iter().collect();

        // Validate all edits first
        for edit in &edits {
            edit.validate(content)?;
        }

        // For non-overlapping regions: earlier edit's end <= later edit's start
        for window in edits.windows(2) {
            let (later, earlier) = (window[0], window[1]);
            if earlier.byte_start > later.byte_start || earlier.overlaps(later) {
                return Err(EditError::InvalidByteRange {
                    byte_start: later.byte_start,
                    byte_end: earlier.byte_end,
                    file_len: content.len(),
                });
            }
        }

        let mut new_content = content.to_string();
        for edit in edits {
            new_content.replace_range(edit.byte_start..edit.byte_end, &edit.new_text);
        }

        Ok(new_content)
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the target is unchanged. Missing
/// parent directories are created.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().ok_or_else(|| {
        EditError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ))
    })?;
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    // Bump mtime so file watchers and incremental tools notice the change
    filetime::set_file_mtime(path, filetime::FileTime::now())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("hello world".to_string());
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        let verify = EditVerification::from_text(&text);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&text));
    }

    #[test]
    fn test_apply_all_descending() {
        let content = "line1\nline2\nline3\n";
        let edits = vec![
            Edit::new("t.py", 12, 17, "LINE3", "line3"),
            Edit::new("t.py", 6, 11, "LINE2", "line2"),
            Edit::new("t.py", 0, 5, "LINE1", "line1"),
        ];
        let out = Edit::apply_all(content, &edits).unwrap();
        assert_eq!(out, "LINE1\nLINE2\nLINE3\n");
    }

    #[test]
    fn test_apply_all_rejects_mismatch() {
        let edits = vec![Edit::new("t.py", 0, 5, "HELLO", "howdy")];
        let result = Edit::apply_all("hello world", &edits);
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
    }

    #[test]
    fn test_apply_all_rejects_inverted_range() {
        let edits = vec![Edit::new("t.py", 10, 5, "x", "")];
        let result = Edit::apply_all("hello world", &edits);
        assert!(matches!(result, Err(EditError::InvalidByteRange { .. })));
    }

    #[test]
    fn test_insertion_and_replacement_at_same_offset() {
        // replacement sorts first (same start, longer span), insertion lands before it
        let edits = vec![
            Edit::new("t.py", 0, 5, "HELLO", "hello"),
            Edit::insert("t.py", 0, "> "),
        ];
        let out = Edit::apply_all("hello world", &edits).unwrap();
        assert_eq!(out, "> HELLO world");
    }

    #[test]
    fn test_overlap_rules() {
        let a = Edit::new("t.py", 2, 6, "", "");
        assert!(a.overlaps(&Edit::new("t.py", 5, 8, "", "")));
        assert!(!a.overlaps(&Edit::new("t.py", 6, 8, "", "")));
        assert!(a.overlaps(&Edit::insert("t.py", 4, "x")));
        assert!(!a.overlaps(&Edit::insert("t.py", 2, "x")));
        assert!(!a.overlaps(&Edit::insert("t.py", 6, "x")));
        assert!(Edit::insert("t.py", 3, "x").overlaps(&Edit::insert("t.py", 3, "y")));
    }

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("pkg/new.py");
        atomic_write(&file_path, b"x = 1\n").unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "x = 1\n");
    }
}
