//! Move: relocate a top-level definition to another file and repoint
//! `from <module> import ...` statements at its new home.

use super::{MoveOp, PlanContext, Planned};
use crate::edit::Edit;
use crate::error::RefactorError;
use crate::index::{Definition, ReferenceKind};
use crate::location::LineIndex;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path};
use std::sync::LazyLock;
use tracing::debug;

static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<indent>[ \t]*)from[ \t]+(?P<module>[\w.]+)[ \t]+import[ \t]+(?P<names>[^#]*?)(?P<tail>[ \t]*#.*)?$",
    )
    .expect("import pattern is valid")
});

pub(crate) fn plan(
    op: usize,
    req: &MoveOp,
    ctx: &mut PlanContext<'_>,
) -> Result<Planned, RefactorError> {
    let source_file = ctx.resolve_path(&req.file)?;
    let dest_file = ctx.resolve_path(&req.dest)?;
    let conflict = |reason: String| RefactorError::DestinationConflict {
        op,
        name: req.name.clone(),
        dest: dest_file.clone(),
        reason,
    };

    if same_file(&source_file, &dest_file) {
        return Err(conflict("destination is the source file".to_string()));
    }

    let resolution = ctx.resolver.resolve_named(op, &source_file, &req.name)?;
    let definition = &resolution.definition;

    let dest_text = ctx.sources.get(&dest_file)?;
    if dest_text.is_some() {
        let existing = ctx.resolver.document_symbols(op, &dest_file)?;
        if existing.iter().any(|d| d.name == req.name) {
            return Err(conflict(format!("it already defines '{}'", req.name)));
        }
    }

    let source = ctx.sources.read(&source_file)?;
    let src = LineIndex::new(&source);
    let (first_line, last_line) = definition_lines(&src, definition);
    let invalid = |line: u32| RefactorError::InvalidPosition {
        op,
        file: source_file.clone(),
        line,
        column: 1,
        reason: "definition extent is outside the file".to_string(),
    };
    let start = src.line_start(first_line).ok_or_else(|| invalid(first_line))?;
    let end = src
        .line_end_inclusive(last_line)
        .ok_or_else(|| invalid(last_line))?;

    let mut block = source[start..end].to_string();
    if !block.ends_with('\n') {
        block.push('\n');
    }

    let mut edits = Vec::new();

    // Remove from the source, taking trailing blank lines along when the
    // definition already sits after a blank line.
    let mut delete_end = end;
    let after_blank = first_line == 1
        || src
            .line_text(first_line - 1)
            .is_some_and(|l| l.trim().is_empty());
    if after_blank {
        let mut line = last_line + 1;
        while line <= src.line_count() && src.line_text(line).is_some_and(|l| l.trim().is_empty()) {
            delete_end = src.line_end_inclusive(line).unwrap_or(delete_end);
            line += 1;
        }
    }
    edits.push(Edit::replace_in(&source_file, &source, start, delete_end, ""));

    // Append to the destination
    let dest = dest_text.as_deref().unwrap_or("");
    let separator = if dest.trim().is_empty() || dest.ends_with("\n\n") {
        ""
    } else if dest.ends_with('\n') {
        "\n"
    } else {
        "\n\n"
    };
    edits.push(Edit::insert(&dest_file, dest.len(), format!("{separator}{block}")));

    // Imports
    let source_module = module_name(ctx.root, &source_file);
    let dest_module = module_name(ctx.root, &dest_file);
    let mut import_lines: BTreeSet<(&Path, u32)> = BTreeSet::new();
    let mut still_used = false;
    for reference in &resolution.references {
        if reference.kind == ReferenceKind::Definition {
            continue;
        }
        if reference.file() == source_file {
            if !(first_line..=last_line).contains(&reference.line()) {
                still_used = true;
            }
            continue;
        }
        import_lines.insert((reference.file(), reference.line()));
    }

    for (path, line) in import_lines {
        let text = ctx.sources.read(path)?;
        let index = LineIndex::new(&text);
        let (Some(line_start), Some(body)) = (index.line_start(line), index.line_text(line)) else {
            continue;
        };
        let in_dest = path == dest_file;
        match rewrite_import(body, &source_module, &dest_module, &req.name, in_dest) {
            Some(ImportRewrite::Replace(new_line)) => {
                let line_end = line_start + body.len();
                edits.push(Edit::replace_in(path, &text, line_start, line_end, new_line));
            }
            Some(ImportRewrite::Delete) => {
                let line_end = index.line_end_inclusive(line).unwrap_or(line_start + body.len());
                edits.push(Edit::replace_in(path, &text, line_start, line_end, ""));
            }
            None => {
                debug!(op, file = %path.display(), line, "reference is not a from-import, left unchanged");
            }
        }
    }

    if still_used {
        let at = import_insert_offset(&src, first_line);
        edits.push(Edit::insert(
            &source_file,
            at,
            format!("from {dest_module} import {}\n", req.name),
        ));
    }

    debug!(
        op,
        from = %source_module,
        to = %dest_module,
        lines = last_line - first_line + 1,
        still_used,
        "move planned"
    );
    Ok(Planned {
        found: resolution.references.len(),
        matched: resolution.references.len(),
        edits,
    })
}

/// First and last full line of a definition, decorators included.
fn definition_lines(src: &LineIndex<'_>, definition: &Definition) -> (u32, u32) {
    let def_line = definition.location.line;
    let mut first = def_line;
    while first > 1
        && src
            .line_text(first - 1)
            .is_some_and(|l| l.starts_with('@'))
    {
        first -= 1;
    }

    let end = definition.extent_end;
    let mut last = if end.column == 1 && end.line > def_line {
        end.line - 1
    } else {
        end.line
    };
    last = last.clamp(def_line, src.line_count().max(def_line));
    (first, last)
}

#[derive(Debug, PartialEq, Eq)]
enum ImportRewrite {
    Replace(String),
    Delete,
}

fn rewrite_import(
    line: &str,
    source_module: &str,
    dest_module: &str,
    name: &str,
    in_dest: bool,
) -> Option<ImportRewrite> {
    let caps = FROM_IMPORT.captures(line)?;
    let module = caps.name("module")?.as_str();
    if module != source_module {
        return None;
    }
    let indent = caps.name("indent").map_or("", |m| m.as_str());
    let tail = caps.name("tail").map_or("", |m| m.as_str());
    let names = caps.name("names")?.as_str().trim();
    let (names, parenthesized) = match names.strip_prefix('(').and_then(|n| n.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (names, false),
    };

    let entries: Vec<&str> = names
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();
    let pos = entries
        .iter()
        .position(|e| e.split_whitespace().next() == Some(name))?;
    let moved = entries[pos];
    let rest: Vec<&str> = entries
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pos)
        .map(|(_, e)| *e)
        .collect();
    let rest = if parenthesized {
        format!("({})", rest.join(", "))
    } else {
        rest.join(", ")
    };

    Some(match (in_dest, entries.len()) {
        (true, 1) => ImportRewrite::Delete,
        (true, _) => {
            ImportRewrite::Replace(format!("{indent}from {module} import {rest}{tail}"))
        }
        (false, 1) => {
            ImportRewrite::Replace(format!("{indent}from {dest_module} import {moved}{tail}"))
        }
        (false, _) => ImportRewrite::Replace(format!(
            "{indent}from {module} import {rest}{tail}\n{indent}from {dest_module} import {moved}"
        )),
    })
}

/// Offset just after the last top-of-file import that precedes `before_line`.
fn import_insert_offset(src: &LineIndex<'_>, before_line: u32) -> usize {
    (1..before_line)
        .filter(|&line| {
            src.line_text(line)
                .is_some_and(|t| t.starts_with("import ") || t.starts_with("from "))
        })
        .last()
        .and_then(|line| src.line_end_inclusive(line))
        .unwrap_or(0)
}

/// Dotted module path of a file relative to the workspace root.
pub(crate) fn module_name(root: &Path, file: &Path) -> String {
    let Ok(relative) = file.strip_prefix(root) else {
        return file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    };
    let relative = relative.with_extension("");
    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.len() > 1 && parts.last().is_some_and(|p| p == "__init__") {
        parts.pop();
    }
    parts.join(".")
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{SymbolId, SymbolKind};
    use crate::location::{Location, Position};

    #[test]
    fn test_module_name() {
        let root = Path::new("/ws");
        assert_eq!(module_name(root, Path::new("/ws/engine.py")), "engine");
        assert_eq!(module_name(root, Path::new("/ws/pkg/cache.py")), "pkg.cache");
        assert_eq!(module_name(root, Path::new("/ws/pkg/__init__.py")), "pkg");
        assert_eq!(module_name(root, Path::new("/elsewhere/util.py")), "util");
    }

    /// Moving `Cache` from `engine` to `cache`.
    fn rewrite_cache(line: &str, in_dest: bool) -> Option<ImportRewrite> {
        rewrite_import(line, "engine", "cache", "Cache", in_dest)
    }

    #[test]
    fn test_sole_import_is_repointed() {
        let out = rewrite_cache("from engine import Cache", false);
        assert_eq!(out, Some(ImportRewrite::Replace("from cache import Cache".to_string())));

        let out = rewrite_cache("    from engine import Cache as C  # hot", false);
        assert_eq!(
            out,
            Some(ImportRewrite::Replace("    from cache import Cache as C  # hot".to_string()))
        );
    }

    #[test]
    fn test_multi_import_is_split() {
        let out = rewrite_cache("from engine import Engine, Cache, run", false);
        assert_eq!(
            out,
            Some(ImportRewrite::Replace(
                "from engine import Engine, run\nfrom cache import Cache".to_string()
            ))
        );
    }

    #[test]
    fn test_other_modules_and_names_ignored() {
        assert_eq!(rewrite_cache("from other import Cache", false), None);
        assert_eq!(rewrite_cache("from engine import CacheX", false), None);
        assert_eq!(rewrite_cache("x = Cache()", false), None);
    }

    #[test]
    fn test_destination_self_import_removed() {
        assert_eq!(
            rewrite_cache("from engine import Cache", true),
            Some(ImportRewrite::Delete)
        );
        assert_eq!(
            rewrite_cache("from engine import (Cache, Engine)", true),
            Some(ImportRewrite::Replace("from engine import (Engine)".to_string()))
        );
    }

    #[test]
    fn test_definition_lines_include_decorators() {
        let text = "import os\n\n@dataclass\nclass Cache:\n    size: int\n\nx = 1\n";
        let src = LineIndex::new(text);
        let definition = Definition {
            id: SymbolId("Cache".to_string()),
            name: "Cache".to_string(),
            kind: SymbolKind::Class,
            location: Location::new("/ws/engine.py", 4, 7),
            extent_end: Position::new(6, 1),
            scope: None,
            top_level: true,
        };
        assert_eq!(definition_lines(&src, &definition), (3, 5));
        assert_eq!(import_insert_offset(&src, 3), "import os\n".len());
    }
}
