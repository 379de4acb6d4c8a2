//! Source coordinates: locations, spans, line ranges and the line index
//! that maps 1-based (line, column) pairs onto byte offsets.
//!
//! Columns count Unicode scalar values within a line. A column one past
//! the last character addresses the end of the line.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

/// A point in a file: 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A point inside a file whose path is known from context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Where a [`Span`] stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanEnd {
    /// Exclusive end position.
    At(Position),
    /// End of the given line, line terminator excluded.
    EndOfLine(u32),
    /// End of the file.
    EndOfFile,
}

/// Half-open text range within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: SpanEnd,
}

impl Span {
    pub fn new(start: Position, end: SpanEnd) -> Self {
        Self { start, end }
    }

    /// Resolve to byte offsets against `index`. `None` when either end is
    /// outside the text or the end precedes the start.
    pub fn byte_range(&self, index: &LineIndex<'_>) -> Option<Range<usize>> {
        let start = index.offset(self.start)?;
        let end = match self.end {
            SpanEnd::At(pos) => index.offset(pos)?,
            SpanEnd::EndOfLine(line) => index.line_end(line)?,
            SpanEnd::EndOfFile => index.text().len(),
        };
        (start <= end).then_some(start..end)
    }
}

/// Inclusive line range; `end: None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRange {
    pub start: u32,
    pub end: Option<u32>,
}

impl LineRange {
    pub const fn new(start: u32, end: Option<u32>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, line: u32) -> bool {
        line >= self.start && self.end.map_or(true, |end| line <= end)
    }

    pub fn is_inverted(&self) -> bool {
        self.end.is_some_and(|end| end < self.start)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// Accepts `[start, end]`, `[start, null]`, `[start]` and `{ start, end }`.
/// TOML has no null, so the short forms matter there.
impl<'de> Deserialize<'de> for LineRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Pair(u32, Option<u32>),
            Single((u32,)),
            Table {
                start: u32,
                #[serde(default)]
                end: Option<u32>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Pair(start, end) => LineRange::new(start, end),
            Repr::Single((start,)) => LineRange::new(start, None),
            Repr::Table { start, end } => LineRange::new(start, end),
        })
    }
}

/// Line table over a borrowed text.
///
/// A trailing line terminator does not open a new line, so `"a\nb\n"` has
/// two lines and the empty text has none.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut starts = Vec::new();
        if !text.is_empty() {
            starts.push(0);
        }
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' && idx + 1 < text.len() {
                starts.push(idx + 1);
            }
        }
        Self { text, starts }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn line_count(&self) -> u32 {
        self.starts.len() as u32
    }

    /// Byte offset where `line` starts. `line_count() + 1` maps to the end
    /// of the text so callers can address "after the last line".
    pub fn line_start(&self, line: u32) -> Option<usize> {
        if line == 0 {
            return None;
        }
        let idx = (line - 1) as usize;
        match idx.cmp(&self.starts.len()) {
            std::cmp::Ordering::Less => Some(self.starts[idx]),
            std::cmp::Ordering::Equal => Some(self.text.len()),
            std::cmp::Ordering::Greater => None,
        }
    }

    /// Byte offset of the end of `line`, excluding `\n` / `\r\n`.
    pub fn line_end(&self, line: u32) -> Option<usize> {
        let start = self.line_start(line)?;
        if line > self.line_count() {
            return Some(start);
        }
        let rest = &self.text[start..];
        let body = match rest.find('\n') {
            Some(nl) => &rest[..nl],
            None => rest,
        };
        let body = body.strip_suffix('\r').unwrap_or(body);
        Some(start + body.len())
    }

    /// Byte offset just past the line terminator of `line` (or end of text).
    pub fn line_end_inclusive(&self, line: u32) -> Option<usize> {
        let end = self.line_end(line)?;
        let rest = &self.text[end..];
        if rest.starts_with("\r\n") {
            Some(end + 2)
        } else if rest.starts_with('\n') {
            Some(end + 1)
        } else {
            Some(end)
        }
    }

    /// Text of `line` without its terminator.
    pub fn line_text(&self, line: u32) -> Option<&'a str> {
        let start = self.line_start(line)?;
        let end = self.line_end(line)?;
        Some(&self.text[start..end])
    }

    /// Byte offset of a 1-based position. The column may point one past
    /// the last character of the line.
    pub fn offset(&self, pos: Position) -> Option<usize> {
        if pos.column == 0 {
            return None;
        }
        let start = self.line_start(pos.line)?;
        let body = self.line_text(pos.line).unwrap_or("");
        let wanted = (pos.column - 1) as usize;
        if wanted == 0 {
            return Some(start);
        }
        let mut chars = body.char_indices();
        match chars.nth(wanted) {
            Some((byte, _)) => Some(start + byte),
            None if body.chars().count() == wanted => Some(start + body.len()),
            None => None,
        }
    }

    /// 1-based position of a byte offset.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line_idx = match self.starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(0) => 0,
            Err(idx) => idx - 1,
        };
        let start = self.starts.get(line_idx).copied().unwrap_or(0);
        let column = self.text[start..offset].chars().count() as u32 + 1;
        Position::new(line_idx as u32 + 1, column)
    }
}
