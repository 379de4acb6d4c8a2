//! Interface to the external symbol service.
//!
//! The engine never parses source itself. Definitions, references and
//! identifier occurrences come from an implementation of [`SymbolIndex`]:
//! a language-server adapter in production, [`MemoryIndex`] in tests and
//! for JSON snapshots exported by such a server.

pub mod memory;

pub use memory::{MemoryIndex, SnapshotError};

use crate::location::{Location, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Opaque identity of a symbol inside one index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub String);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Function,
    Method,
    Variable,
    Constant,
    Parameter,
    Property,
    Other,
}

impl SymbolKind {
    pub fn is_callable(self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }
}

/// How a reference uses its symbol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The definition site itself
    Definition,
    /// An import statement naming the symbol
    Import,
    #[default]
    Usage,
}

/// Lines of the local scope a symbol is visible in (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRange {
    pub start_line: u32,
    pub end_line: u32,
}

impl ScopeRange {
    pub fn contains(&self, line: u32) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

/// Canonical definition of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Start of the defining identifier
    pub location: Location,
    /// Exclusive end of the whole definition (body included)
    pub extent_end: Position,
    /// Local scope for function-local symbols; `None` for module level
    pub scope: Option<ScopeRange>,
    pub top_level: bool,
}

impl Definition {
    pub fn file(&self) -> &Path {
        &self.location.file
    }

    /// Exclusive end column of the defining identifier.
    pub fn name_end_column(&self) -> u32 {
        self.location.column + self.name.chars().count() as u32
    }
}

/// One place a symbol is named.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Reference {
    pub location: Location,
    /// Exclusive end column of the identifier on the same line
    pub end_column: u32,
    pub kind: ReferenceKind,
}

impl Reference {
    pub fn file(&self) -> &Path {
        &self.location.file
    }

    pub fn line(&self) -> u32 {
        self.location.line
    }
}

/// An identifier occurrence on a line, as reported for anchoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub symbol: SymbolId,
    pub name: String,
    /// Inclusive start column
    pub start_column: u32,
    /// Exclusive end column
    pub end_column: u32,
}

impl Occurrence {
    pub fn contains(&self, column: u32) -> bool {
        self.start_column <= column && column < self.end_column
    }
}

#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("symbol service timed out")]
    Timeout,

    #[error("unknown symbol: {0}")]
    UnknownSymbol(SymbolId),

    #[error("symbol service unavailable: {0}")]
    Unavailable(String),
}

/// Queries the engine needs from a symbol service.
///
/// Implementations are stateful and shared: the resolver serializes all
/// calls through one lock. Paths are absolute.
pub trait SymbolIndex: Send {
    /// Identifier occurrences on `line` of `file`, in column order.
    fn occurrences(&self, file: &Path, line: u32) -> Result<Vec<Occurrence>, IndexError>;

    fn definition(&self, symbol: &SymbolId) -> Result<Option<Definition>, IndexError>;

    /// Every reference to `symbol`, including its definition site.
    fn references(&self, symbol: &SymbolId) -> Result<Vec<Reference>, IndexError>;

    /// Top-level definitions in `file`.
    fn document_symbols(&self, file: &Path) -> Result<Vec<Definition>, IndexError>;
}

impl<T: SymbolIndex + ?Sized> SymbolIndex for Box<T> {
    fn occurrences(&self, file: &Path, line: u32) -> Result<Vec<Occurrence>, IndexError> {
        (**self).occurrences(file, line)
    }

    fn definition(&self, symbol: &SymbolId) -> Result<Option<Definition>, IndexError> {
        (**self).definition(symbol)
    }

    fn references(&self, symbol: &SymbolId) -> Result<Vec<Reference>, IndexError> {
        (**self).references(symbol)
    }

    fn document_symbols(&self, file: &Path) -> Result<Vec<Definition>, IndexError> {
        (**self).document_symbols(file)
    }
}
