//! CopyPaste: copy a text range into a destination point.

use super::{offset_of, CopyPasteOp, PlanContext, Planned};
use crate::edit::Edit;
use crate::error::RefactorError;
use crate::location::{LineIndex, Position, Span, SpanEnd};
use std::ops::Range;
use tracing::debug;

pub(crate) fn plan(
    op: usize,
    req: &CopyPasteOp,
    ctx: &mut PlanContext<'_>,
) -> Result<Planned, RefactorError> {
    let from = ctx.resolve_path(&req.from_file)?;
    let to = ctx.resolve_path(&req.to_file)?;

    let source = ctx.sources.read(&from)?;
    let src = LineIndex::new(&source);
    let last = src.line_count();
    let end_line = req.end_line.unwrap_or(last);

    let invalid = |file: &std::path::Path, line: u32, column: u32, reason: String| {
        RefactorError::InvalidPosition {
            op,
            file: file.to_path_buf(),
            line,
            column,
            reason,
        }
    };
    if req.start_line == 0 || req.start_line > last {
        return Err(invalid(
            &from,
            req.start_line,
            req.start_col,
            format!("file has {last} line(s)"),
        ));
    }
    if end_line < req.start_line || end_line > last {
        return Err(invalid(
            &from,
            end_line,
            req.end_col.unwrap_or(1),
            format!("end line must be in {}..={last}", req.start_line),
        ));
    }

    let start_pos = Position::new(req.start_line, req.start_col);
    offset_of(op, &from, &src, start_pos)?;
    let span_end = match req.end_col {
        Some(column) => SpanEnd::At(Position::new(end_line, column)),
        None => SpanEnd::EndOfLine(end_line),
    };
    let Range { start, end } = Span::new(start_pos, span_end)
        .byte_range(&src)
        .ok_or_else(|| {
            invalid(
                &from,
                end_line,
                req.end_col.unwrap_or(1),
                "range end is outside the line or before its start".to_string(),
            )
        })?;

    let dest_text = ctx.sources.get(&to)?;
    let dest = dest_text.as_deref().unwrap_or("");
    let dst = LineIndex::new(dest);
    let append_line = dst.line_count() + 1;
    if req.to_line == append_line && req.to_col != 1 {
        return Err(invalid(
            &to,
            req.to_line,
            req.to_col,
            "appending after the last line requires column 1".to_string(),
        ));
    }
    let at = offset_of(op, &to, &dst, Position::new(req.to_line, req.to_col))?;

    if from == to && start < at && at < end {
        return Err(RefactorError::SpanConflict {
            op,
            file: from.clone(),
            source_start: src.position(start),
            source_end: src.position(end),
            dest: Position::new(req.to_line, req.to_col),
        });
    }

    let mut block = source[start..end].to_string();
    let whole_lines = req.start_col == 1 && req.end_col.is_none();
    if whole_lines && req.to_col == 1 {
        let terminator = src
            .line_end_inclusive(end_line)
            .map(|after| &source[end..after])
            .filter(|t| !t.is_empty())
            .unwrap_or("\n");
        block.push_str(terminator);
        if at == dest.len() && !dest.is_empty() && !dest.ends_with('\n') {
            block.insert(0, '\n');
        }
    }

    debug!(
        op,
        bytes = block.len(),
        created = dest_text.is_none(),
        "copy planned"
    );
    Ok(Planned {
        found: 1,
        matched: 1,
        edits: vec![Edit::insert(&to, at, block)],
    })
}
