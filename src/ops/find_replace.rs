//! FindReplace: literal or regex replacement over files and directories.

use super::{FindReplaceOp, PlanContext, Planned};
use crate::edit::Edit;
use crate::error::RefactorError;
use crate::location::LineIndex;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

enum Matcher<'a> {
    Literal(&'a str),
    Regex(Regex),
}

impl Matcher<'_> {
    /// Non-overlapping matches as (byte range, replacement).
    fn replacements(&self, text: &str, replace: &str) -> Vec<(usize, usize, String)> {
        match self {
            Matcher::Literal(needle) => text
                .match_indices(needle)
                .map(|(start, m)| (start, start + m.len(), replace.to_string()))
                .collect(),
            Matcher::Regex(re) => re
                .captures_iter(text)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let mut expanded = String::new();
                    caps.expand(replace, &mut expanded);
                    Some((whole.start(), whole.end(), expanded))
                })
                .collect(),
        }
    }
}

pub(crate) fn plan(
    op: usize,
    req: &FindReplaceOp,
    ctx: &mut PlanContext<'_>,
) -> Result<Planned, RefactorError> {
    if req.find.is_empty() {
        return Err(RefactorError::InvalidPattern {
            op,
            pattern: String::new(),
            message: "search pattern is empty".to_string(),
        });
    }
    let matcher = if req.regex {
        Matcher::Regex(Regex::new(&req.find).map_err(|e| RefactorError::InvalidPattern {
            op,
            pattern: req.find.clone(),
            message: e.to_string(),
        })?)
    } else {
        Matcher::Literal(&req.find)
    };
    let filter = req.filter.compile(op, ctx.root)?;
    let files = collect_files(req, ctx)?;

    let mut found = 0;
    let mut edits = Vec::new();
    for (file, explicit) in files {
        let text = if explicit {
            ctx.sources.read(&file)?
        } else {
            match ctx.sources.get(&file) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    warn!(op, file = %file.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            }
        };

        let matches = matcher.replacements(&text, &req.replace);
        found += matches.len();
        if matches.is_empty() || !filter.admits_file(&file) {
            continue;
        }

        let index = LineIndex::new(&text);
        for (start, end, replacement) in matches {
            if !filter.admits_line(index.position(start).line) {
                continue;
            }
            edits.push(Edit::replace_in(&file, &text, start, end, replacement));
        }
    }

    debug!(op, found, matched = edits.len(), "find/replace scanned");
    Ok(Planned {
        found,
        matched: edits.len(),
        edits,
    })
}

/// Files to scan, mapped to whether they were named explicitly.
fn collect_files(
    req: &FindReplaceOp,
    ctx: &PlanContext<'_>,
) -> Result<BTreeMap<PathBuf, bool>, RefactorError> {
    let mut files = BTreeMap::new();
    for entry in req.paths.entries() {
        let path = ctx.resolve_path(entry.path())?;
        if !path.is_dir() {
            files.insert(path, true);
            continue;
        }

        let max_depth = if entry.recursive() { usize::MAX } else { 1 };
        let walker = WalkDir::new(&path)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for dent in walker {
            let dent = dent.map_err(|e| {
                let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
                RefactorError::io(at, e.into())
            })?;
            if dent.file_type().is_file() && ctx.settings.is_source_file(dent.path()) {
                files.entry(dent.into_path()).or_insert(false);
            }
        }
    }
    Ok(files)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
