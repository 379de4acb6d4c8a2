//! Operation planners.
//!
//! Each operation in a batch is planned independently against the shared
//! source snapshots and compiles down to a list of [`Edit`]s. Planners
//! never write; the batcher merges their output and the applier commits it.

pub mod copy_paste;
pub mod find_replace;
pub mod move_symbol;
pub mod rename;
pub mod scan;
pub mod signature;
pub mod toggle_comment;

use crate::batch::PlannedEdit;
use crate::config::Settings;
use crate::edit::Edit;
use crate::error::RefactorError;
use crate::filter::Filter;
use crate::index::Reference;
use crate::location::{LineIndex, Position};
use crate::pathmap::PathMap;
use crate::resolver::LocationResolver;
use crate::source::SourceCache;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Rename,
    RenameLocal,
    Move,
    ChangeSignature,
    FindReplace,
    ToggleComment,
    CopyPaste,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Rename => "rename",
            OpKind::RenameLocal => "rename_local",
            OpKind::Move => "move",
            OpKind::ChangeSignature => "change_signature",
            OpKind::FindReplace => "find_replace",
            OpKind::ToggleComment => "toggle_comment",
            OpKind::CopyPaste => "copy_paste",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical refactor request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Rename(RenameOp),
    RenameLocal(RenameOp),
    Move(MoveOp),
    ChangeSignature(ChangeSignatureOp),
    FindReplace(FindReplaceOp),
    ToggleComment(ToggleCommentOp),
    CopyPaste(CopyPasteOp),
}

/// Rename the symbol at `file:line:column`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RenameOp {
    #[serde(alias = "filePath")]
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    #[serde(alias = "newName")]
    pub new_name: String,
    #[serde(default)]
    pub filter: Filter,
}

/// Move the top-level definition `name` from `file` to `dest`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MoveOp {
    #[serde(alias = "filePath")]
    pub file: PathBuf,
    pub name: String,
    #[serde(alias = "destPath")]
    pub dest: PathBuf,
}

/// Replace the parameter list of `function` and update its call sites.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeSignatureOp {
    #[serde(alias = "filePath")]
    pub file: PathBuf,
    #[serde(alias = "functionName")]
    pub function: String,
    #[serde(alias = "newParams")]
    pub new_params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FindReplaceOp {
    pub paths: PathsSpec,
    pub find: String,
    pub replace: String,
    #[serde(default, alias = "is_regex")]
    pub regex: bool,
    #[serde(default)]
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToggleCommentOp {
    #[serde(alias = "filePath")]
    pub file: PathBuf,
    pub start_line: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CopyPasteOp {
    pub from_file: PathBuf,
    pub start_line: u32,
    pub start_col: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_col: Option<u32>,
    pub to_file: PathBuf,
    pub to_line: u32,
    pub to_col: u32,
}

/// `paths` of a find-and-replace: one entry or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PathsSpec {
    One(PathEntry),
    Many(Vec<PathEntry>),
}

/// A file, or a directory with a recursive flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PathEntry {
    Path(PathBuf),
    Pair(PathBuf, bool),
    Dir {
        dir: PathBuf,
        #[serde(default)]
        recursive: bool,
    },
}

impl PathEntry {
    pub fn path(&self) -> &Path {
        match self {
            PathEntry::Path(path) | PathEntry::Pair(path, _) | PathEntry::Dir { dir: path, .. } => {
                path
            }
        }
    }

    pub fn recursive(&self) -> bool {
        match self {
            PathEntry::Path(_) => false,
            PathEntry::Pair(_, recursive) | PathEntry::Dir { recursive, .. } => *recursive,
        }
    }
}

impl PathsSpec {
    pub fn entries(&self) -> &[PathEntry] {
        match self {
            PathsSpec::One(entry) => std::slice::from_ref(entry),
            PathsSpec::Many(entries) => entries,
        }
    }
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Rename(_) => OpKind::Rename,
            Operation::RenameLocal(_) => OpKind::RenameLocal,
            Operation::Move(_) => OpKind::Move,
            Operation::ChangeSignature(_) => OpKind::ChangeSignature,
            Operation::FindReplace(_) => OpKind::FindReplace,
            Operation::ToggleComment(_) => OpKind::ToggleComment,
            Operation::CopyPaste(_) => OpKind::CopyPaste,
        }
    }

    /// Short human description, as shown in previews.
    pub fn describe(&self) -> String {
        match self {
            Operation::Rename(op) | Operation::RenameLocal(op) => format!(
                "{}:{}:{} -> {}",
                op.file.display(),
                op.line,
                op.column,
                op.new_name
            ),
            Operation::Move(op) => format!(
                "{} from {} to {}",
                op.name,
                op.file.display(),
                op.dest.display()
            ),
            Operation::ChangeSignature(op) => {
                format!("{}({})", op.function, op.new_params.join(", "))
            }
            Operation::FindReplace(op) => format!("'{}' -> '{}'", op.find, op.replace),
            Operation::ToggleComment(op) => match op.end_line {
                Some(end) => format!("{}:{}-{}", op.file.display(), op.start_line, end),
                None => format!("{}:{}-", op.file.display(), op.start_line),
            },
            Operation::CopyPaste(op) => format!(
                "{}:{} -> {}:{}:{}",
                op.from_file.display(),
                op.start_line,
                op.to_file.display(),
                op.to_line,
                op.to_col
            ),
        }
    }

    /// Plan this operation. `index` is its position in the batch.
    pub fn plan(
        &self,
        index: usize,
        ctx: &mut PlanContext<'_>,
    ) -> Result<(OpStats, Vec<PlannedEdit>), RefactorError> {
        let planned = match self {
            Operation::Rename(op) => rename::plan(index, op, rename::Scope::Workspace, ctx)?,
            Operation::RenameLocal(op) => rename::plan(index, op, rename::Scope::Local, ctx)?,
            Operation::Move(op) => move_symbol::plan(index, op, ctx)?,
            Operation::ChangeSignature(op) => signature::plan(index, op, ctx)?,
            Operation::FindReplace(op) => find_replace::plan(index, op, ctx)?,
            Operation::ToggleComment(op) => toggle_comment::plan(index, op, ctx)?,
            Operation::CopyPaste(op) => copy_paste::plan(index, op, ctx)?,
        };

        let kind = self.kind();
        let files: BTreeSet<&Path> = planned.edits.iter().map(|e| e.file.as_path()).collect();
        let stats = OpStats {
            index,
            kind,
            description: self.describe(),
            found: planned.found,
            matched: planned.matched,
            edits: planned.edits.len(),
            files: files.len(),
        };
        debug!(
            op = index,
            kind = %kind,
            found = stats.found,
            matched = stats.matched,
            edits = stats.edits,
            "planned"
        );

        let edits = planned
            .edits
            .into_iter()
            .map(|edit| PlannedEdit::new(index, kind, edit))
            .collect();
        Ok((stats, edits))
    }
}

/// Per-operation counts reported by every phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpStats {
    pub index: usize,
    pub kind: OpKind,
    pub description: String,
    /// References, matches or lines the operation found
    pub found: usize,
    /// How many of those survived the filter
    pub matched: usize,
    pub edits: usize,
    pub files: usize,
}

/// Shared state for planning one batch.
pub struct PlanContext<'a> {
    pub root: &'a Path,
    pub resolver: &'a LocationResolver,
    pub settings: &'a Settings,
    pub file_map: &'a PathMap,
    pub sources: &'a mut SourceCache,
}

impl PlanContext<'_> {
    /// Map a user-supplied name or path to an absolute path.
    pub fn resolve_path(&self, name: &Path) -> Result<PathBuf, RefactorError> {
        self.file_map.resolve(name, self.root)
    }
}

/// What a planner hands back to dispatch.
#[derive(Debug, Default)]
pub(crate) struct Planned {
    pub found: usize,
    pub matched: usize,
    pub edits: Vec<Edit>,
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Byte offset of `pos`, or `InvalidPosition`.
pub(crate) fn offset_of(
    op: usize,
    file: &Path,
    index: &LineIndex<'_>,
    pos: Position,
) -> Result<usize, RefactorError> {
    index.offset(pos).ok_or_else(|| RefactorError::InvalidPosition {
        op,
        file: file.to_path_buf(),
        line: pos.line,
        column: pos.column,
        reason: format!("file has {} line(s)", index.line_count()),
    })
}

/// Byte range of a reference's identifier, checked against `name`.
pub(crate) fn identifier_span(
    op: usize,
    index: &LineIndex<'_>,
    reference: &Reference,
    name: &str,
) -> Result<Range<usize>, RefactorError> {
    let start = index.offset(reference.location.position());
    let end = index.offset(Position::new(reference.line(), reference.end_column));
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) if start <= end => (start, end),
        _ => {
            return Err(RefactorError::StaleReference {
                op,
                location: reference.location.clone(),
                expected: name.to_string(),
                found: String::new(),
            })
        }
    };
    let found = &index.text()[start..end];
    if found != name {
        return Err(RefactorError::StaleReference {
            op,
            location: reference.location.clone(),
            expected: name.to_string(),
            found: found.to_string(),
        });
    }
    Ok(start..end)
}

/// References grouped by file, keeping their order within each file.
pub(crate) fn by_file(references: &[Reference]) -> BTreeMap<&Path, Vec<&Reference>> {
    let mut grouped: BTreeMap<&Path, Vec<&Reference>> = BTreeMap::new();
    for reference in references {
        grouped.entry(reference.file()).or_default().push(reference);
    }
    grouped
}
