//! ToggleComment: per-line comment prefix toggling.

use super::{PlanContext, Planned, ToggleCommentOp};
use crate::edit::Edit;
use crate::error::RefactorError;
use crate::location::LineIndex;
use std::ops::Range;

pub(crate) fn plan(
    op: usize,
    req: &ToggleCommentOp,
    ctx: &mut PlanContext<'_>,
) -> Result<Planned, RefactorError> {
    let file = ctx.resolve_path(&req.file)?;
    let text = ctx.sources.read(&file)?;
    let index = LineIndex::new(&text);
    let prefix = ctx.settings.comment_prefix(&file);

    let last = index.line_count();
    let end = req.end_line.unwrap_or(last);
    let invalid = |line: u32, reason: String| RefactorError::InvalidPosition {
        op,
        file: file.clone(),
        line,
        column: 1,
        reason,
    };
    if req.start_line == 0 || req.start_line > last {
        return Err(invalid(req.start_line, format!("file has {last} line(s)")));
    }
    if end < req.start_line || end > last {
        return Err(invalid(
            end,
            format!("end line must be in {}..={last}", req.start_line),
        ));
    }

    let mut edits = Vec::new();
    for line in req.start_line..=end {
        let (Some(line_start), Some(body)) = (index.line_start(line), index.line_text(line)) else {
            continue;
        };
        if let Some((range, replacement)) = toggle_line(body, prefix) {
            edits.push(Edit::replace_in(
                &file,
                &text,
                line_start + range.start,
                line_start + range.end,
                replacement,
            ));
        }
    }

    let lines = (end - req.start_line + 1) as usize;
    Ok(Planned {
        found: lines,
        matched: lines,
        edits,
    })
}

/// The edit that toggles one line, relative to the line start. Blank
/// lines are left alone.
///
/// Commenting inserts `prefix + " "` after the indentation and
/// uncommenting removes exactly that marker, so toggling twice always
/// gives back the original line. A line counts as commented when it
/// carries an odd number of stacked markers: `# # x` was commented twice
/// and gains a third, while `#x` and `#!` lines are not markers at all.
pub(crate) fn toggle_line(line: &str, prefix: &str) -> Option<(Range<usize>, String)> {
    let body = line.trim_start_matches(INDENT);
    if body.is_empty() {
        return None;
    }
    let indent = line.len() - body.len();
    let marker = format!("{prefix} ");

    if marker_depth(body, &marker) % 2 == 1 {
        Some((indent..indent + marker.len(), String::new()))
    } else {
        Some((indent..indent, marker))
    }
}

const INDENT: [char; 2] = [' ', '\t'];

/// Stacked markers at the start of `body`. A marker only counts when
/// removing it leaves text that does not start with indentation.
fn marker_depth(mut body: &str, marker: &str) -> usize {
    let mut depth = 0;
    while let Some(rest) = body.strip_prefix(marker) {
        if rest.is_empty() || rest.starts_with(INDENT) {
            break;
        }
        depth += 1;
        body = rest;
    }
    depth
}
