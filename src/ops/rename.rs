//! Rename and RenameLocal.

use super::{by_file, identifier_span, is_identifier, PlanContext, Planned, RenameOp};
use crate::edit::Edit;
use crate::error::RefactorError;
use crate::location::{LineIndex, Location};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    /// Every reference in the workspace
    Workspace,
    /// Only references inside the definition's local scope
    Local,
}

pub(crate) fn plan(
    op: usize,
    req: &RenameOp,
    scope: Scope,
    ctx: &mut PlanContext<'_>,
) -> Result<Planned, RefactorError> {
    if !is_identifier(&req.new_name) {
        return Err(RefactorError::InvalidName {
            op,
            name: req.new_name.clone(),
        });
    }

    let file = ctx.resolve_path(&req.file)?;
    let anchor = Location::new(&file, req.line, req.column);
    let resolution = ctx.resolver.resolve(op, &anchor)?;
    let definition = resolution.definition;
    let mut references = resolution.references;

    if scope == Scope::Local {
        references.retain(|r| {
            r.file() == definition.file()
                && definition.scope.map_or(true, |s| s.contains(r.line()))
        });
        debug!(op, kept = references.len(), scope = ?definition.scope, "restricted to local scope");
    }

    let found = references.len();
    let filter = req.filter.compile(op, ctx.root)?;
    let references = filter.apply(references, |r| (r.file(), r.line()));
    let matched = references.len();

    let mut edits = Vec::with_capacity(matched);
    for (path, refs) in by_file(&references) {
        let text = ctx.sources.read(path)?;
        let index = LineIndex::new(&text);
        for reference in refs {
            let span = identifier_span(op, &index, reference, &definition.name)?;
            edits.push(Edit::new(
                path,
                span.start,
                span.end,
                req.new_name.as_str(),
                &definition.name,
            ));
        }
    }

    Ok(Planned {
        found,
        matched,
        edits,
    })
}
