//! Filter Engine: narrows reference or match sets by file globs and line
//! ranges. Exclusions are evaluated after inclusions and always win.

use crate::error::RefactorError;
use crate::location::LineRange;
use glob::Pattern;
use serde::Deserialize;
use std::path::Path;

/// Optional per-operation predicate bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Filter {
    #[serde(default)]
    pub include_files: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_files: Option<Vec<String>>,
    #[serde(default)]
    pub include_lines: Option<Vec<LineRange>>,
    #[serde(default)]
    pub exclude_lines: Option<Vec<LineRange>>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.include_files.is_none()
            && self.exclude_files.is_none()
            && self.include_lines.is_none()
            && self.exclude_lines.is_none()
    }

    /// Compile glob patterns once per operation.
    pub fn compile(&self, op: usize, root: &Path) -> Result<CompiledFilter, RefactorError> {
        type Compiled = Result<Option<Vec<Pattern>>, RefactorError>;
        let compile_all = |patterns: &Option<Vec<String>>| -> Compiled {
            patterns
                .as_ref()
                .map(|list| {
                    list.iter()
                        .map(|p| {
                            Pattern::new(p).map_err(|e| RefactorError::InvalidPattern {
                                op,
                                pattern: p.clone(),
                                message: e.to_string(),
                            })
                        })
                        .collect()
                })
                .transpose()
        };

        Ok(CompiledFilter {
            root: root.to_path_buf(),
            include_files: compile_all(&self.include_files)?,
            exclude_files: compile_all(&self.exclude_files)?,
            include_lines: self.include_lines.clone(),
            exclude_lines: self.exclude_lines.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledFilter {
    root: std::path::PathBuf,
    include_files: Option<Vec<Pattern>>,
    exclude_files: Option<Vec<Pattern>>,
    include_lines: Option<Vec<LineRange>>,
    exclude_lines: Option<Vec<LineRange>>,
}

impl CompiledFilter {
    /// Whether the file passes the glob predicates on its own.
    pub fn admits_file(&self, file: &Path) -> bool {
        if let Some(include) = &self.include_files {
            if !include.iter().any(|p| self.glob_matches(p, file)) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude_files {
            if exclude.iter().any(|p| self.glob_matches(p, file)) {
                return false;
            }
        }
        true
    }

    pub fn admits_line(&self, line: u32) -> bool {
        if let Some(include) = &self.include_lines {
            if !include.iter().any(|r| r.contains(line)) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude_lines {
            if exclude.iter().any(|r| r.contains(line)) {
                return false;
            }
        }
        true
    }

    pub fn admits(&self, file: &Path, line: u32) -> bool {
        self.admits_file(file) && self.admits_line(line)
    }

    /// Keep the items whose location passes.
    pub fn apply<T>(&self, items: Vec<T>, location: impl Fn(&T) -> (&Path, u32)) -> Vec<T> {
        items
            .into_iter()
            .filter(|item| {
                let (file, line) = location(item);
                self.admits(file, line)
            })
            .collect()
    }

    /// Globs are tried against the workspace-relative path and the full path.
    fn glob_matches(&self, pattern: &Pattern, file: &Path) -> bool {
        if pattern.matches_path(file) {
            return true;
        }
        file.strip_prefix(&self.root)
            .map(|rel| pattern.matches_path(rel))
            .unwrap_or(false)
    }
}
