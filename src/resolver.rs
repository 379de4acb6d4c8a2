//! Location Resolver: anchors coordinates to a canonical definition and
//! its workspace-wide reference set.
//!
//! The symbol service is a single shared, stateful resource. Every query
//! goes through one lock, and both waiting for the lock and the query
//! itself are bounded by the configured timeout.

use crate::error::RefactorError;
use crate::index::{Definition, IndexError, Reference, ReferenceKind, SymbolId, SymbolIndex};
use crate::location::Location;
use crate::suggest;
use parking_lot::Mutex;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A definition together with every place it is referenced.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub definition: Definition,
    /// Sorted by file, line, column; contains the definition site once.
    pub references: Vec<Reference>,
}

pub struct LocationResolver {
    index: Mutex<Box<dyn SymbolIndex>>,
    timeout: Duration,
}

impl LocationResolver {
    pub fn new(index: impl SymbolIndex + 'static, timeout: Duration) -> Self {
        Self {
            index: Mutex::new(Box::new(index)),
            timeout,
        }
    }

    fn query<T>(
        &self,
        op: usize,
        f: impl FnOnce(&dyn SymbolIndex) -> Result<T, IndexError>,
    ) -> Result<T, RefactorError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let guard = self
            .index
            .try_lock_for(self.timeout)
            .ok_or(RefactorError::ResolverTimeout { op, timeout_ms })?;

        let started = Instant::now();
        let result = f(&**guard);
        let elapsed = started.elapsed();
        trace!(op, ?elapsed, "symbol query");

        if elapsed > self.timeout {
            return Err(RefactorError::ResolverTimeout { op, timeout_ms });
        }
        result.map_err(|e| match e {
            IndexError::Timeout => RefactorError::ResolverTimeout { op, timeout_ms },
            other => RefactorError::Resolver {
                op,
                message: other.to_string(),
            },
        })
    }

    /// Anchor `at` to the leftmost identifier whose span contains its
    /// column, then collect the symbol's definition and references.
    pub fn resolve(&self, op: usize, at: &Location) -> Result<Resolution, RefactorError> {
        let occurrences = self.query(op, |index| index.occurrences(&at.file, at.line))?;

        if occurrences.is_empty() {
            return Err(RefactorError::SymbolNotFound {
                op,
                target: at.to_string(),
                reason: "no identifier on this line".to_string(),
            });
        }

        let Some(anchor) = occurrences.iter().find(|occ| occ.contains(at.column)) else {
            return Err(RefactorError::AmbiguousAnchor {
                op,
                location: at.clone(),
                candidates: occurrences
                    .iter()
                    .map(|occ| format!("{}@{}", occ.name, occ.start_column))
                    .collect(),
            });
        };

        debug!(op, symbol = %anchor.symbol, location = %at, "anchored");
        self.resolve_symbol(op, &anchor.symbol, &at.to_string())
    }

    /// Find a top-level definition named `name` in `file`.
    pub fn resolve_named(
        &self,
        op: usize,
        file: &Path,
        name: &str,
    ) -> Result<Resolution, RefactorError> {
        let symbols = self.document_symbols(op, file)?;
        let Some(definition) = symbols.iter().find(|def| def.name == name) else {
            let suggestion = suggest::closest(name, symbols.iter().map(|d| d.name.as_str()));
            return Err(RefactorError::SymbolNotFound {
                op,
                target: format!("'{name}' in {}", file.display()),
                reason: match suggestion {
                    Some(s) => format!("no top-level definition (did you mean '{s}'?)"),
                    None => "no top-level definition".to_string(),
                },
            });
        };
        let target = format!("'{name}' in {}", file.display());
        self.resolve_symbol(op, &definition.id, &target)
    }

    pub fn document_symbols(
        &self,
        op: usize,
        file: &Path,
    ) -> Result<Vec<Definition>, RefactorError> {
        self.query(op, |index| index.document_symbols(file))
    }

    fn resolve_symbol(
        &self,
        op: usize,
        symbol: &SymbolId,
        target: &str,
    ) -> Result<Resolution, RefactorError> {
        let definition = self
            .query(op, |index| index.definition(symbol))?
            .ok_or_else(|| RefactorError::SymbolNotFound {
                op,
                target: target.to_string(),
                reason: format!("symbol {symbol} has no definition"),
            })?;

        let raw = self.query(op, |index| index.references(symbol))?;
        if raw.is_empty() {
            return Err(RefactorError::SymbolNotFound {
                op,
                target: target.to_string(),
                reason: "symbol has no references (stale coordinates?)".to_string(),
            });
        }

        let references = normalize_references(&definition, raw);
        debug!(op, symbol = %symbol, count = references.len(), "references resolved");
        Ok(Resolution {
            definition,
            references,
        })
    }
}

/// Sort, deduplicate, and make sure the definition site appears exactly once.
fn normalize_references(definition: &Definition, raw: Vec<Reference>) -> Vec<Reference> {
    let mut references: Vec<Reference> = raw
        .into_iter()
        .filter(|r| r.location != definition.location)
        .collect();
    references.push(Reference {
        location: definition.location.clone(),
        end_column: definition.name_end_column(),
        kind: ReferenceKind::Definition,
    });
    references.sort_by(|a, b| a.location.cmp(&b.location));
    references.dedup_by(|a, b| a.location == b.location);
    references
}
