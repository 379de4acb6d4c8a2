use crate::filter::Filter;
use crate::location::LineRange;
use crate::ops::{Operation, PathsSpec};
use crate::pathmap::PathMap;
use crate::phase::{Batch, Phase};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A batch request document, as read from TOML or JSON.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct BatchRequest {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, alias = "fileMap")]
    pub file_map: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl BatchRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.operations.is_empty() {
            issues.push(ValidationIssue::EmptyOperationList);
        }

        for (name, path) in &self.file_map {
            if name.trim().is_empty() || path.as_os_str().is_empty() {
                issues.push(ValidationIssue::InvalidValue {
                    op: None,
                    message: format!("file_map entry '{name}' needs a name and a path"),
                });
            }
        }

        for (idx, operation) in self.operations.iter().enumerate() {
            let mut check = Checker {
                op: idx,
                issues: &mut issues,
            };
            match operation {
                Operation::Rename(op) | Operation::RenameLocal(op) => {
                    check.path("file", &op.file);
                    check.positive("line", op.line);
                    check.positive("column", op.column);
                    check.text("new_name", &op.new_name);
                    check.filter(&op.filter);
                }
                Operation::Move(op) => {
                    check.path("file", &op.file);
                    check.text("name", &op.name);
                    check.path("dest", &op.dest);
                }
                Operation::ChangeSignature(op) => {
                    check.path("file", &op.file);
                    check.text("function", &op.function);
                    for param in &op.new_params {
                        if param.trim().is_empty() {
                            check.invalid("new_params contains an empty entry".to_string());
                        }
                    }
                }
                Operation::FindReplace(op) => {
                    if op.find.is_empty() {
                        check.missing("find");
                    }
                    match &op.paths {
                        PathsSpec::Many(entries) if entries.is_empty() => check.missing("paths"),
                        paths => {
                            for entry in paths.entries() {
                                check.path("paths", entry.path());
                            }
                        }
                    }
                    check.filter(&op.filter);
                }
                Operation::ToggleComment(op) => {
                    check.path("file", &op.file);
                    check.positive("start_line", op.start_line);
                    if let Some(end) = op.end_line {
                        check.range("start_line..end_line", op.start_line, end);
                    }
                }
                Operation::CopyPaste(op) => {
                    check.path("from_file", &op.from_file);
                    check.path("to_file", &op.to_file);
                    check.positive("start_line", op.start_line);
                    check.positive("start_col", op.start_col);
                    check.positive("to_line", op.to_line);
                    check.positive("to_col", op.to_col);
                    if let Some(end) = op.end_line {
                        check.range("start_line..end_line", op.start_line, end);
                    }
                    if let Some(end_col) = op.end_col {
                        check.positive("end_col", end_col);
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Split into the engine's batch and the requested phase.
    pub fn into_batch(self) -> (Batch, Phase) {
        let file_map: PathMap = self.file_map.into_iter().collect();
        (
            Batch {
                file_map,
                operations: self.operations,
            },
            self.phase,
        )
    }
}

struct Checker<'a> {
    op: usize,
    issues: &'a mut Vec<ValidationIssue>,
}

impl Checker<'_> {
    fn missing(&mut self, field: &'static str) {
        self.issues.push(ValidationIssue::MissingField {
            op: Some(self.op),
            field,
        });
    }

    fn invalid(&mut self, message: String) {
        self.issues.push(ValidationIssue::InvalidValue {
            op: Some(self.op),
            message,
        });
    }

    fn path(&mut self, field: &'static str, path: &Path) {
        if path.as_os_str().is_empty() {
            self.missing(field);
        }
    }

    fn text(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.missing(field);
        }
    }

    fn positive(&mut self, field: &'static str, value: u32) {
        if value == 0 {
            self.invalid(format!("{field} is 1-based and must be at least 1"));
        }
    }

    fn range(&mut self, field: &'static str, start: u32, end: u32) {
        if end < start {
            self.invalid(format!("{field} is inverted ({start} > {end})"));
        }
    }

    fn filter(&mut self, filter: &Filter) {
        let ranges = filter
            .include_lines
            .iter()
            .chain(filter.exclude_lines.iter())
            .flatten();
        for range in ranges {
            self.line_range(range);
        }
        let globs = filter
            .include_files
            .iter()
            .chain(filter.exclude_files.iter())
            .flatten();
        for glob in globs {
            if glob.trim().is_empty() {
                self.invalid("filter contains an empty file pattern".to_string());
            }
        }
    }

    fn line_range(&mut self, range: &LineRange) {
        if range.start == 0 {
            self.invalid(format!("line range {range} starts at 0"));
        }
        if range.is_inverted() {
            self.invalid(format!("line range {range} is inverted"));
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyOperationList,
    MissingField {
        op: Option<usize>,
        field: &'static str,
    },
    InvalidValue {
        op: Option<usize>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyOperationList => write!(f, "request contains no operations"),
            ValidationIssue::MissingField { op, field } => match op {
                Some(idx) => write!(f, "operation {idx} missing required field '{field}'"),
                None => write!(f, "request missing required field '{field}'"),
            },
            ValidationIssue::InvalidValue { op, message } => match op {
                Some(idx) => write!(f, "operation {idx} is invalid: {message}"),
                None => write!(f, "invalid request: {message}"),
            },
        }
    }
}
