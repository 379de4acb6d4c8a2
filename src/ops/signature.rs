//! ChangeSignature: rewrite a function's parameter list and every call.

use super::scan::{matching_paren, split_top_level, top_level_assign};
use super::{by_file, identifier_span, is_identifier, ChangeSignatureOp, PlanContext, Planned};
use crate::edit::Edit;
use crate::error::{CallProblem, CallSiteConflict, RefactorError};
use crate::index::{ReferenceKind, SymbolKind};
use crate::location::{LineIndex, Location};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use tracing::debug;

/// One entry of the requested parameter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Param {
    pub name: String,
    pub has_default: bool,
    pub text: String,
}

/// Parse `name[: type][ = default]`.
pub(crate) fn parse_param(op: usize, text: &str) -> Result<Param, RefactorError> {
    let text = text.trim();
    let invalid = |reason: &str| RefactorError::InvalidParameter {
        op,
        text: text.to_string(),
        reason: reason.to_string(),
    };

    let (head, default) = match top_level_assign(text) {
        Some(eq) => (&text[..eq], Some(text[eq + 1..].trim())),
        None => (text, None),
    };
    if default == Some("") {
        return Err(invalid("default value is empty"));
    }
    let name = match head.split_once(':') {
        Some((name, annotation)) => {
            if annotation.trim().is_empty() {
                return Err(invalid("type annotation is empty"));
            }
            name.trim()
        }
        None => head.trim(),
    };
    if name.starts_with('*') {
        return Err(invalid("variadic parameters are not supported"));
    }
    if !is_identifier(name) {
        return Err(invalid("expected name[: type][ = default]"));
    }

    Ok(Param {
        name: name.to_string(),
        has_default: default.is_some(),
        text: text.to_string(),
    })
}

/// What we need to know about the current parameter list.
#[derive(Debug, Default)]
struct CurrentSignature {
    /// Leading `self` / `cls`
    receiver: Option<String>,
    /// Parameters that accept positional arguments, in order
    positional: Vec<String>,
    names: BTreeSet<String>,
}

impl CurrentSignature {
    fn parse(items: &[&str]) -> Self {
        let mut sig = CurrentSignature::default();
        let mut keyword_only = false;
        for (i, item) in items.iter().enumerate() {
            if *item == "/" || item.starts_with("**") {
                continue;
            }
            if item.starts_with('*') {
                keyword_only = true;
                continue;
            }
            let end = item.find([':', '=']).unwrap_or(item.len());
            let name = item[..end].trim().to_string();
            if i == 0 && (name == "self" || name == "cls") {
                sig.receiver = Some(name);
                continue;
            }
            if !keyword_only {
                sig.positional.push(name.clone());
            }
            sig.names.insert(name);
        }
        sig
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Arg<'a> {
    Positional(&'a str),
    Keyword(&'a str),
    Unpack,
}

fn classify(item: &str) -> Arg<'_> {
    if item.starts_with('*') {
        return Arg::Unpack;
    }
    if let Some(eq) = top_level_assign(item) {
        let name = item[..eq].trim();
        if is_identifier(name) {
            return Arg::Keyword(name);
        }
    }
    Arg::Positional(item)
}

/// How a call supplied an argument.
#[derive(Debug, Clone, Copy)]
enum Supplied<'a> {
    /// By position; holds the value
    Positional(&'a str),
    /// By keyword; holds the whole `name=value` item as written
    Keyword(&'a str),
}

fn rewrite_call(
    items: &[&str],
    current: &CurrentSignature,
    params: &[Param],
) -> Result<Vec<String>, CallProblem> {
    let new_names: BTreeSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
    let mut values: HashMap<&str, Supplied<'_>> = HashMap::new();
    let mut unknown = Vec::new();
    let mut position = 0;

    for item in items {
        match classify(item) {
            Arg::Unpack => return Err(CallProblem::Unpacking),
            Arg::Positional(value) => {
                let Some(name) = current.positional.get(position) else {
                    return Err(CallProblem::TooManyPositional);
                };
                values.insert(name.as_str(), Supplied::Positional(value));
                position += 1;
            }
            Arg::Keyword(name) => {
                if current.names.contains(name) || new_names.contains(name) {
                    values.insert(name, Supplied::Keyword(item));
                } else {
                    unknown.push(item.to_string());
                }
            }
        }
    }

    let mut out = Vec::with_capacity(params.len() + unknown.len());
    let mut missing = Vec::new();
    let mut positional = true;
    for param in params {
        match values.get(param.name.as_str()) {
            Some(Supplied::Positional(value)) if positional => out.push(value.to_string()),
            Some(Supplied::Positional(value)) => out.push(format!("{}={}", param.name, value)),
            Some(Supplied::Keyword(item)) => {
                positional = false;
                out.push(item.to_string());
            }
            None => {
                positional = false;
                if !param.has_default {
                    missing.push(param.name.clone());
                }
            }
        }
    }
    out.extend(unknown);

    if missing.is_empty() {
        Ok(out)
    } else {
        Err(CallProblem::Missing(missing))
    }
}

/// A call of the target function in one file, with the calls nested in
/// its argument list.
#[derive(Debug)]
struct CallSite {
    location: Location,
    /// Byte range between the parentheses
    args: Range<usize>,
    children: Vec<usize>,
}

/// Arrange call sites into nesting trees and return the roots.
///
/// Argument ranges of balanced calls are either disjoint or nested.
fn nest_calls(sites: &mut Vec<CallSite>) -> Vec<usize> {
    sites.sort_by(|a, b| {
        a.args
            .start
            .cmp(&b.args.start)
            .then(b.args.end.cmp(&a.args.end))
    });
    sites.dedup_by(|a, b| a.args == b.args);

    let mut roots = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    for i in 0..sites.len() {
        while open
            .last()
            .is_some_and(|&top| sites[top].args.end <= sites[i].args.start)
        {
            open.pop();
        }
        match open.last() {
            Some(&parent) => sites[parent].children.push(i),
            None => roots.push(i),
        }
        open.push(i);
    }
    roots
}

/// New text between the parentheses of `sites[at]`, rewriting nested calls
/// first so the enclosing call sees their new argument lists.
fn render_call(
    sites: &[CallSite],
    at: usize,
    text: &str,
    current: &CurrentSignature,
    params: &[Param],
    conflicts: &mut Vec<CallSiteConflict>,
) -> String {
    let site = &sites[at];
    let mut inner = String::with_capacity(site.args.len());
    let mut cursor = site.args.start;
    for &child in &site.children {
        let nested = &sites[child].args;
        inner.push_str(&text[cursor..nested.start]);
        inner.push_str(&render_call(sites, child, text, current, params, conflicts));
        cursor = nested.end;
    }
    inner.push_str(&text[cursor..site.args.end]);

    let items: Vec<&str> = split_top_level(&inner)
        .into_iter()
        .map(|r| &inner[r])
        .collect();
    let rewritten = match rewrite_call(&items, current, params) {
        Ok(args) if args.iter().map(String::as_str).ne(items.iter().copied()) => {
            Some(args.join(", "))
        }
        Ok(_) => None,
        Err(problem) => {
            conflicts.push(CallSiteConflict {
                location: site.location.clone(),
                problem,
            });
            None
        }
    };
    rewritten.unwrap_or(inner)
}

/// Index of the `(` following `from`, skipping spaces and tabs.
fn open_paren_after(text: &str, from: usize) -> Option<usize> {
    let rest = &text[from..];
    let skipped = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    (rest[skipped..].starts_with('(')).then_some(from + skipped)
}

pub(crate) fn plan(
    op: usize,
    req: &ChangeSignatureOp,
    ctx: &mut PlanContext<'_>,
) -> Result<Planned, RefactorError> {
    let file = ctx.resolve_path(&req.file)?;
    let params = req
        .new_params
        .iter()
        .map(|p| parse_param(op, p))
        .collect::<Result<Vec<_>, _>>()?;
    let mut seen = BTreeSet::new();
    if let Some(dup) = params.iter().find(|p| !seen.insert(p.name.as_str())) {
        return Err(RefactorError::InvalidParameter {
            op,
            text: dup.text.clone(),
            reason: format!("duplicate parameter '{}'", dup.name),
        });
    }

    let resolution = ctx.resolver.resolve_named(op, &file, &req.function)?;
    let definition = resolution.definition;
    if !definition.kind.is_callable() && definition.kind != SymbolKind::Other {
        return Err(RefactorError::SymbolNotFound {
            op,
            target: format!("'{}' in {}", req.function, file.display()),
            reason: format!("definition is a {:?}, not a function", definition.kind),
        });
    }

    let mut edits = Vec::new();

    // Definition
    let def_file = definition.file().to_path_buf();
    let text = ctx.sources.read(&def_file)?;
    let index = LineIndex::new(&text);
    let def_ref = resolution
        .references
        .iter()
        .find(|r| r.kind == ReferenceKind::Definition)
        .ok_or_else(|| RefactorError::SymbolNotFound {
            op,
            target: definition.location.to_string(),
            reason: "definition site missing from references".to_string(),
        })?;
    let name_span = identifier_span(op, &index, def_ref, &definition.name)?;
    let bad_def = |reason: &str| RefactorError::InvalidPosition {
        op,
        file: def_file.clone(),
        line: definition.location.line,
        column: definition.location.column,
        reason: reason.to_string(),
    };
    let open = open_paren_after(&text, name_span.end)
        .ok_or_else(|| bad_def("definition is not followed by a parameter list"))?;
    let close =
        matching_paren(&text, open).ok_or_else(|| bad_def("unbalanced parameter list"))?;
    let inner = &text[open + 1..close];
    let current_items: Vec<&str> = split_top_level(inner).into_iter().map(|r| &inner[r]).collect();
    let current = CurrentSignature::parse(&current_items);

    let repeats_receiver = matches!(
        (&current.receiver, params.first()),
        (Some(receiver), Some(first)) if &first.name == receiver
    );
    let params: Vec<Param> = params.into_iter().skip(usize::from(repeats_receiver)).collect();
    let mut rendered: Vec<&str> = Vec::with_capacity(params.len() + 1);
    if let Some(receiver) = &current.receiver {
        rendered.push(receiver);
    }
    rendered.extend(params.iter().map(|p| p.text.as_str()));
    let new_list = rendered.join(", ");
    if new_list != current_items.join(", ") {
        edits.push(Edit::replace_in(&def_file, &text, open + 1, close, new_list));
    }

    // Call sites
    let mut calls = 0;
    let mut conflicts = Vec::new();
    for (path, refs) in by_file(&resolution.references) {
        let text = ctx.sources.read(path)?;
        let index = LineIndex::new(&text);
        let mut sites = Vec::new();
        for reference in refs {
            if reference.kind == ReferenceKind::Definition {
                continue;
            }
            let span = identifier_span(op, &index, reference, &definition.name)?;
            let Some(open) = open_paren_after(&text, span.end) else {
                continue;
            };
            calls += 1;
            match matching_paren(&text, open) {
                Some(close) => sites.push(CallSite {
                    location: reference.location.clone(),
                    args: open + 1..close,
                    children: Vec::new(),
                }),
                None => conflicts.push(CallSiteConflict {
                    location: reference.location.clone(),
                    problem: CallProblem::Unbalanced,
                }),
            }
        }

        for root in nest_calls(&mut sites) {
            let args = sites[root].args.clone();
            let rendered = render_call(&sites, root, &text, &current, &params, &mut conflicts);
            if rendered != text[args.clone()] {
                edits.push(Edit::replace_in(path, &text, args.start, args.end, rendered));
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(RefactorError::SignatureConflict {
            op,
            function: definition.name.clone(),
            sites: conflicts,
        });
    }

    debug!(op, calls, edits = edits.len(), "signature planned");
    Ok(Planned {
        found: resolution.references.len(),
        matched: calls,
        edits,
    })
}
