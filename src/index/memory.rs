//! In-memory symbol index.
//!
//! Holds definitions and reference sets exported by a language server (as
//! a JSON snapshot) or built programmatically in tests.

use super::{
    Definition, IndexError, Occurrence, Reference, ReferenceKind, ScopeRange, SymbolId,
    SymbolIndex, SymbolKind,
};
use crate::location::{Location, Position};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read symbol snapshot {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse symbol snapshot {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    symbols: Vec<SymbolRecord>,
}

#[derive(Debug, Deserialize)]
struct SymbolRecord {
    #[serde(default)]
    id: Option<String>,
    name: String,
    kind: SymbolKind,
    file: PathBuf,
    line: u32,
    column: u32,
    #[serde(default)]
    end_line: Option<u32>,
    #[serde(default)]
    end_column: Option<u32>,
    #[serde(default)]
    scope: Option<ScopeRange>,
    #[serde(default)]
    top_level: Option<bool>,
    #[serde(default)]
    references: Vec<ReferenceRecord>,
}

#[derive(Debug, Deserialize)]
struct ReferenceRecord {
    file: PathBuf,
    line: u32,
    column: u32,
    #[serde(default)]
    kind: ReferenceKind,
}

#[derive(Debug, Clone)]
struct Entry {
    definition: Definition,
    references: Vec<Reference>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    symbols: BTreeMap<SymbolId, Entry>,
    next_id: usize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON snapshot; relative file paths resolve against `base`.
    pub fn from_json_path(path: impl AsRef<Path>, base: &Path) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents, base).map_err(|source| SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json_str(input: &str, base: &Path) -> Result<Self, serde_json::Error> {
        let snapshot: Snapshot = serde_json::from_str(input)?;
        let mut index = MemoryIndex::new();

        for record in snapshot.symbols {
            let file = base.join(&record.file);
            let location = Location::new(&file, record.line, record.column);
            let id = match record.id {
                Some(id) => index.define_with_id(SymbolId(id), &record.name, record.kind, location),
                None => index.define(&record.name, record.kind, location),
            };
            if let Some(end_line) = record.end_line {
                let end_column = record.end_column.unwrap_or(1);
                index.set_extent(&id, Position::new(end_line, end_column));
            }
            if let Some(scope) = record.scope {
                index.set_scope(&id, scope);
            }
            if let Some(top_level) = record.top_level {
                index.set_top_level(&id, top_level);
            }
            for reference in record.references {
                let location = Location::new(
                    base.join(&reference.file),
                    reference.line,
                    reference.column,
                );
                index.add_reference(&id, location, reference.kind);
            }
        }

        Ok(index)
    }

    /// Register a definition whose identifier starts at `location`.
    pub fn define(&mut self, name: &str, kind: SymbolKind, location: Location) -> SymbolId {
        self.next_id += 1;
        let id = SymbolId(format!("{name}#{}", self.next_id));
        self.define_with_id(id, name, kind, location)
    }

    pub fn define_with_id(
        &mut self,
        id: SymbolId,
        name: &str,
        kind: SymbolKind,
        location: Location,
    ) -> SymbolId {
        let extent_end = Position::new(
            location.line,
            location.column + name.chars().count() as u32,
        );
        let top_level = !matches!(
            kind,
            SymbolKind::Method | SymbolKind::Parameter | SymbolKind::Property
        );
        let definition = Definition {
            id: id.clone(),
            name: name.to_string(),
            kind,
            location,
            extent_end,
            scope: None,
            top_level,
        };
        self.symbols.insert(
            id.clone(),
            Entry {
                definition,
                references: Vec::new(),
            },
        );
        id
    }

    /// Set the exclusive end of the whole definition.
    pub fn set_extent(&mut self, id: &SymbolId, end: Position) {
        if let Some(entry) = self.symbols.get_mut(id) {
            entry.definition.extent_end = end;
        }
    }

    /// Mark a symbol as local to `scope` (no longer top level).
    pub fn set_scope(&mut self, id: &SymbolId, scope: ScopeRange) {
        if let Some(entry) = self.symbols.get_mut(id) {
            entry.definition.scope = Some(scope);
            entry.definition.top_level = false;
        }
    }

    pub fn set_top_level(&mut self, id: &SymbolId, top_level: bool) {
        if let Some(entry) = self.symbols.get_mut(id) {
            entry.definition.top_level = top_level;
        }
    }

    pub fn add_reference(&mut self, id: &SymbolId, location: Location, kind: ReferenceKind) {
        if let Some(entry) = self.symbols.get_mut(id) {
            let end_column = location.column + entry.definition.name.chars().count() as u32;
            entry.references.push(Reference {
                location,
                end_column,
                kind,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    fn definition_reference(definition: &Definition) -> Reference {
        Reference {
            location: definition.location.clone(),
            end_column: definition.name_end_column(),
            kind: ReferenceKind::Definition,
        }
    }
}

impl SymbolIndex for MemoryIndex {
    fn occurrences(&self, file: &Path, line: u32) -> Result<Vec<Occurrence>, IndexError> {
        let mut found = Vec::new();
        for (id, entry) in &self.symbols {
            let definition_site = Self::definition_reference(&entry.definition);
            for reference in std::iter::once(&definition_site).chain(entry.references.iter()) {
                if reference.location.line == line && reference.location.file == file {
                    found.push(Occurrence {
                        symbol: id.clone(),
                        name: entry.definition.name.clone(),
                        start_column: reference.location.column,
                        end_column: reference.end_column,
                    });
                }
            }
        }
        found.sort_by_key(|occ| (occ.start_column, occ.end_column));
        found.dedup_by(|a, b| a.symbol == b.symbol && a.start_column == b.start_column);
        Ok(found)
    }

    fn definition(&self, symbol: &SymbolId) -> Result<Option<Definition>, IndexError> {
        Ok(self.symbols.get(symbol).map(|e| e.definition.clone()))
    }

    fn references(&self, symbol: &SymbolId) -> Result<Vec<Reference>, IndexError> {
        let entry = self
            .symbols
            .get(symbol)
            .ok_or_else(|| IndexError::UnknownSymbol(symbol.clone()))?;
        let mut refs = vec![Self::definition_reference(&entry.definition)];
        refs.extend(entry.references.iter().cloned());
        Ok(refs)
    }

    fn document_symbols(&self, file: &Path) -> Result<Vec<Definition>, IndexError> {
        Ok(self
            .symbols
            .values()
            .filter(|e| e.definition.top_level && e.definition.file() == file)
            .map(|e| e.definition.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrences_cover_definition_and_references() {
        let mut index = MemoryIndex::new();
        let id = index.define("count", SymbolKind::Variable, Location::new("/w/a.py", 1, 1));
        index.add_reference(&id, Location::new("/w/a.py", 3, 9), ReferenceKind::Usage);

        let occ = index.occurrences(Path::new("/w/a.py"), 3).unwrap();
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].start_column, 9);
        assert_eq!(occ[0].end_column, 14);

        let refs = index.references(&id).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, ReferenceKind::Definition);
    }

    #[test]
    fn test_scope_clears_top_level() {
        let mut index = MemoryIndex::new();
        let id = index.define("tmp", SymbolKind::Variable, Location::new("/w/a.py", 2, 5));
        index.set_scope(&id, ScopeRange { start_line: 1, end_line: 4 });
        assert!(index.document_symbols(Path::new("/w/a.py")).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_resolves_relative_paths() {
        let json = r#"{
            "symbols": [{
                "id": "engine.Cache",
                "name": "Cache",
                "kind": "class",
                "file": "engine.py",
                "line": 3, "column": 7,
                "end_line": 6, "end_column": 1,
                "references": [{"file": "main.py", "line": 1, "column": 20, "kind": "import"}]
            }]
        }"#;
        let index = MemoryIndex::from_json_str(json, Path::new("/ws")).unwrap();
        let id = SymbolId("engine.Cache".to_string());
        let def = index.definition(&id).unwrap().unwrap();
        assert_eq!(def.location.file, PathBuf::from("/ws/engine.py"));
        assert_eq!(def.extent_end, Position::new(6, 1));
        assert!(def.top_level);

        let refs = index.references(&id).unwrap();
        assert_eq!(refs[1].kind, ReferenceKind::Import);
        assert_eq!(refs[1].location.file, PathBuf::from("/ws/main.py"));
    }
}
