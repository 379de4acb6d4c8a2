//! Bracket- and quote-aware scanning of argument and parameter lists.
//!
//! This is not a parser: it only knows enough about brackets, string
//! literals and `#` comments to find the closing parenthesis of a call and
//! to split its contents at top-level commas.

use std::ops::Range;

/// Index of the `)` matching the `(` at `open`.
pub(crate) fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (bytes[i] == b')').then_some(i);
                }
            }
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'#' => i = skip_comment(bytes, i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Ranges of the top-level comma-separated items of `inner`, trimmed of
/// surrounding whitespace. Empty items (a trailing comma) are dropped.
pub(crate) fn split_top_level(inner: &str) -> Vec<Range<usize>> {
    let bytes = inner.as_bytes();
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut item_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'#' => i = skip_comment(bytes, i),
            b',' if depth == 0 => {
                push_trimmed(inner, item_start..i, &mut items);
                item_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    push_trimmed(inner, item_start..bytes.len(), &mut items);
    items
}

/// Byte index of the first top-level `=` that is an assignment (not part
/// of `==`, `<=`, `>=`, `!=`).
pub(crate) fn top_level_assign(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'=' if depth == 0 => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1).copied();
                let compound = matches!(prev, Some(b'=' | b'<' | b'>' | b'!' | b':'))
                    || next == Some(b'=');
                if !compound {
                    return Some(i);
                }
                if next == Some(b'=') {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn push_trimmed(text: &str, mut range: Range<usize>, items: &mut Vec<Range<usize>>) {
    loop {
        let slice = &text[range.clone()];
        range.start += slice.len() - slice.trim_start().len();
        let bytes = &text.as_bytes()[range.clone()];
        match find_comment(bytes) {
            Some(0) => range.start += skip_comment(bytes, 0),
            Some(pos) => {
                range.end = range.start + pos;
                break;
            }
            None => break,
        }
    }
    let trimmed = text[range.clone()].trim_end();
    if trimmed.is_empty() {
        return;
    }
    items.push(range.start..range.start + trimmed.len());
}

/// Position of the first `#` outside a string literal.
fn find_comment(bytes: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => i = skip_string(bytes, i),
            b'#' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the closing quote of the string starting at `start`.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b if b == quote => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}
