//! Symbol Patcher: batch, symbol-aware refactoring for Python workspaces
//!
//! A refactoring engine built on byte-span replacement primitives. Symbol
//! knowledge comes from an injected [`SymbolIndex`]; everything else is
//! plain text work over snapshots of the workspace.
//!
//! # Architecture
//!
//! All operations compile down to a single primitive: [`Edit`], a
//! verified byte-span replacement. Planners turn one [`Operation`] into
//! edits, the [`EditBatcher`] rejects overlaps across the whole batch, and
//! the [`Refactorer`] either reports the plan or hands it to the
//! [`AtomicApplier`].
//!
//! # Safety
//!
//! - All edits verify expected before-text before rendering
//! - Every file is rendered before the first write
//! - Atomic file writes (tempfile + fsync + rename)
//! - Snapshot hash check before each write, full rollback on failure
//! - Workspace boundary enforcement
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use symbol_patcher::{MemoryIndex, Phase, Refactorer, Settings};
//!
//! let root = Path::new("/work/project");
//! let index = MemoryIndex::from_json_path(root.join(".symbol-index.json"), root)?;
//! let engine = Refactorer::new(root, index, Settings::default())?;
//! let request = symbol_patcher::load_request_from_path("rename.toml")?;
//! let (batch, _phase) = request.into_batch();
//!
//! let report = engine.run(&batch, Phase::Preview)?;
//! for op in report.operations() {
//!     println!("{op}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod applier;
pub mod batch;
pub mod config;
pub mod edit;
pub mod error;
pub mod filter;
pub mod index;
pub mod location;
pub mod ops;
pub mod pathmap;
pub mod phase;
pub mod report;
pub mod resolver;
pub mod safety;
pub mod source;
pub mod suggest;

// Re-exports
pub use applier::AtomicApplier;
pub use batch::{EditBatcher, EditOrigin, EditSet, FileEdits, PlannedEdit};
pub use config::{
    load_request_from_path, load_request_from_str, load_settings_from_path,
    load_settings_from_str, BatchRequest, ConfigError, RequestFormat, Settings, ValidationError,
    ValidationIssue,
};
pub use edit::{Edit, EditError, EditVerification};
pub use error::{CallProblem, CallSiteConflict, RefactorError};
pub use filter::Filter;
pub use index::{
    Definition, IndexError, MemoryIndex, Occurrence, Reference, ReferenceKind, SymbolId,
    SymbolIndex, SymbolKind,
};
pub use location::{LineIndex, LineRange, Location, Position, Span, SpanEnd};
pub use ops::{OpKind, OpStats, Operation};
pub use pathmap::PathMap;
pub use phase::{Batch, Phase, Plan, Refactorer};
pub use report::{
    summary_line, ApplyReport, ChangesReport, FileDiff, FileOutcome, FileStatus, PhaseReport,
    PreviewReport,
};
pub use resolver::{LocationResolver, Resolution};
pub use safety::{SafetyError, WorkspaceGuard};
