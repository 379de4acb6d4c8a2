use crate::batch::EditOrigin;
use crate::edit::EditError;
use crate::location::{Location, Position};
use crate::safety::SafetyError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A call site that cannot be rewritten for a new signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSiteConflict {
    pub location: Location,
    pub problem: CallProblem,
}

/// Why a call site cannot be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallProblem {
    /// New required parameters the call does not supply
    Missing(Vec<String>),
    /// `*args` / `**kwargs` at the call
    Unpacking,
    /// More positional arguments than the old signature accepts
    TooManyPositional,
    /// The argument list never closes
    Unbalanced,
}

impl fmt::Display for CallProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallProblem::Missing(names) => write!(f, "missing {}", names.join(", ")),
            CallProblem::Unpacking => f.write_str("argument unpacking"),
            CallProblem::TooManyPositional => {
                f.write_str("more positional arguments than parameters")
            }
            CallProblem::Unbalanced => f.write_str("unbalanced argument list"),
        }
    }
}

/// Everything that can stop a batch.
///
/// Planning errors abort before any file is touched. Apply errors are
/// reported after the applier has rolled the batch back.
#[derive(Error, Debug)]
pub enum RefactorError {
    #[error("operation {op}: symbol not found at {target}: {reason}")]
    SymbolNotFound {
        op: usize,
        target: String,
        reason: String,
    },

    #[error("operation {op}: {location} is not on an identifier (nearby: {})", candidates.join(", "))]
    AmbiguousAnchor {
        op: usize,
        location: Location,
        candidates: Vec<String>,
    },

    #[error("unknown file name '{name}'{}", suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnknownShortName {
        name: String,
        suggestion: Option<String>,
    },

    #[error("operation {op}: cannot move '{name}' to {}: {reason}", dest.display())]
    DestinationConflict {
        op: usize,
        name: String,
        dest: PathBuf,
        reason: String,
    },

    #[error("operation {op}: {} call site(s) of '{function}' cannot be rewritten for the new signature: {}", sites.len(), describe_sites(sites))]
    SignatureConflict {
        op: usize,
        function: String,
        sites: Vec<CallSiteConflict>,
    },

    #[error("overlapping edits in {}: {first} and {second}", file.display())]
    EditConflict {
        file: PathBuf,
        first: EditOrigin,
        second: EditOrigin,
    },

    #[error("operation {op}: copy into {} at {dest} overlaps its source {source_start}..{source_end}", file.display())]
    SpanConflict {
        op: usize,
        file: PathBuf,
        source_start: Position,
        source_end: Position,
        dest: Position,
    },

    #[error("operation {op}: symbol service did not answer within {timeout_ms}ms")]
    ResolverTimeout { op: usize, timeout_ms: u64 },

    #[error("write failed on {}: {reason}; restored {} file(s){}", file.display(), restored.len(), describe_unrestored(unrestored))]
    PartialWriteFailure {
        file: PathBuf,
        reason: String,
        restored: Vec<PathBuf>,
        unrestored: Vec<PathBuf>,
    },

    #[error("operation {op}: invalid position {}:{line}:{column}: {reason}", file.display())]
    InvalidPosition {
        op: usize,
        file: PathBuf,
        line: u32,
        column: u32,
        reason: String,
    },

    #[error("operation {op}: invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        op: usize,
        pattern: String,
        message: String,
    },

    #[error("operation {op}: invalid parameter '{text}': {reason}")]
    InvalidParameter {
        op: usize,
        text: String,
        reason: String,
    },

    #[error("operation {op}: '{name}' is not a valid identifier")]
    InvalidName { op: usize, name: String },

    #[error("operation {op}: reference at {location} reads '{found}', expected '{expected}' (index out of date?)")]
    StaleReference {
        op: usize,
        location: Location,
        expected: String,
        found: String,
    },

    #[error("operation {op}: symbol service error: {message}")]
    Resolver { op: usize, message: String },

    #[error("cannot render edits for {}: {source}", file.display())]
    Edit {
        file: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace boundary: {0}")]
    Workspace(#[from] SafetyError),
}

impl RefactorError {
    /// Index of the operation that raised the error, when there is one.
    pub fn operation(&self) -> Option<usize> {
        match self {
            RefactorError::SymbolNotFound { op, .. }
            | RefactorError::AmbiguousAnchor { op, .. }
            | RefactorError::DestinationConflict { op, .. }
            | RefactorError::SignatureConflict { op, .. }
            | RefactorError::SpanConflict { op, .. }
            | RefactorError::ResolverTimeout { op, .. }
            | RefactorError::InvalidPosition { op, .. }
            | RefactorError::InvalidPattern { op, .. }
            | RefactorError::InvalidParameter { op, .. }
            | RefactorError::InvalidName { op, .. }
            | RefactorError::StaleReference { op, .. }
            | RefactorError::Resolver { op, .. } => Some(*op),
            RefactorError::EditConflict { first, .. } => Some(first.op),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RefactorError::Io {
            path: path.into(),
            source,
        }
    }
}

fn describe_sites(sites: &[CallSiteConflict]) -> String {
    sites
        .iter()
        .map(|site| format!("{} ({})", site.location, site.problem))
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_unrestored(unrestored: &[PathBuf]) -> String {
    if unrestored.is_empty() {
        return String::new();
    }
    let files: Vec<String> = unrestored.iter().map(|p| p.display().to_string()).collect();
    format!("; FAILED TO RESTORE {}", files.join(", "))
}
