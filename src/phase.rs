//! Phase Controller.
//!
//! [`Refactorer::plan`] is the only place a batch is turned into edits.
//! The three phases are views over the same [`Plan`], so what preview
//! counts is exactly what apply writes.

use crate::applier::AtomicApplier;
use crate::batch::{EditBatcher, EditSet};
use crate::config::Settings;
use crate::error::RefactorError;
use crate::index::SymbolIndex;
use crate::ops::{OpStats, Operation, PlanContext};
use crate::pathmap::PathMap;
use crate::report::{ApplyReport, ChangesReport, FileDiff, PhaseReport, PreviewReport};
use crate::resolver::LocationResolver;
use crate::safety::WorkspaceGuard;
use crate::source::SourceCache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Counts per operation
    Preview,
    /// Unified diffs
    Changes,
    /// Write to disk
    #[default]
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Preview => "preview",
            Phase::Changes => "changes",
            Phase::Apply => "apply",
        })
    }
}

/// Operations plus the short names they may use for files.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub file_map: PathMap,
    pub operations: Vec<Operation>,
}

impl Batch {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            file_map: PathMap::new(),
            operations,
        }
    }

    pub fn with_file_map(mut self, file_map: PathMap) -> Self {
        self.file_map = file_map;
        self
    }
}

/// The planned outcome of a batch.
#[derive(Debug, Clone)]
pub struct Plan {
    pub stats: Vec<OpStats>,
    pub edits: EditSet,
}

/// The refactoring engine for one workspace.
pub struct Refactorer {
    resolver: LocationResolver,
    settings: Settings,
    guard: WorkspaceGuard,
}

impl Refactorer {
    /// `root` is canonicalized; relative paths in batches resolve against it.
    pub fn new(
        root: impl AsRef<Path>,
        index: impl SymbolIndex + 'static,
        settings: Settings,
    ) -> Result<Self, RefactorError> {
        let guard = WorkspaceGuard::new(root)?;
        let resolver = LocationResolver::new(index, settings.resolver_timeout());
        Ok(Self {
            resolver,
            settings,
            guard,
        })
    }

    pub fn root(&self) -> &Path {
        self.guard.workspace_root()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Plan every operation against one set of snapshots and merge the
    /// result. Touches nothing on disk.
    pub fn plan(&self, batch: &Batch) -> Result<Plan, RefactorError> {
        let mut sources = SourceCache::new();
        let mut batcher = EditBatcher::new();
        let mut stats = Vec::with_capacity(batch.operations.len());

        {
            let mut ctx = PlanContext {
                root: self.root(),
                resolver: &self.resolver,
                settings: &self.settings,
                file_map: &batch.file_map,
                sources: &mut sources,
            };
            for (index, operation) in batch.operations.iter().enumerate() {
                let (op_stats, edits) = operation.plan(index, &mut ctx)?;
                stats.push(op_stats);
                batcher.extend(edits);
            }
        }

        let edits = batcher.finish(&mut sources)?;
        info!(
            operations = stats.len(),
            files = edits.file_count(),
            edits = edits.edit_count(),
            "batch planned"
        );
        Ok(Plan { stats, edits })
    }

    /// Plan once and report or commit according to `phase`.
    pub fn run(&self, batch: &Batch, phase: Phase) -> Result<PhaseReport, RefactorError> {
        let plan = self.plan(batch)?;
        match phase {
            Phase::Preview => Ok(PhaseReport::Preview(self.preview(plan))),
            Phase::Changes => self.changes(plan).map(PhaseReport::Changes),
            Phase::Apply => self.commit(&plan).map(PhaseReport::Apply),
        }
    }

    fn preview(&self, plan: Plan) -> PreviewReport {
        PreviewReport {
            total_edits: plan.edits.edit_count(),
            total_files: plan.edits.file_count(),
            operations: plan.stats,
        }
    }

    fn changes(&self, plan: Plan) -> Result<ChangesReport, RefactorError> {
        let files = plan
            .edits
            .files()
            .map(|file| {
                let modified = file.render()?;
                Ok(FileDiff::render(
                    file,
                    &modified,
                    self.settings.diff_context,
                    self.root(),
                ))
            })
            .collect::<Result<Vec<_>, RefactorError>>()?;
        Ok(ChangesReport {
            operations: plan.stats,
            files,
        })
    }

    /// Write a previously computed plan. Fails without writing if any
    /// file changed since it was planned.
    pub fn commit(&self, plan: &Plan) -> Result<ApplyReport, RefactorError> {
        let files = AtomicApplier::new(&self.guard).commit(&plan.edits)?;
        Ok(ApplyReport {
            operations: plan.stats.clone(),
            files,
        })
    }
}
