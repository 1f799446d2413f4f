//! Per-source revision number mapping.
//!
//! Every source repository numbers its own revisions 1, 2, 3, … When a
//! revision is merged it is assigned the next number in the combined
//! repository, and that assignment is recorded here so later revisions of
//! the *same* source can have their `Node-copyfrom-rev` references
//! resolved. Each source owns exactly one [`RevisionMap`]; maps are never
//! shared across sources.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors from [`RevisionMap`] operations.
///
/// Both variants are unrecoverable for the current run: a duplicate
/// recording is a scheduling bug, and an unresolvable lookup means the
/// source history references a revision that was never merged — which
/// cannot happen when revisions are merged strictly in increasing local
/// order and copy sources precede their copies.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RevMapError {
    /// A mapping for this source revision was already recorded.
    #[error("source revision {local} is already mapped to merged revision {existing}")]
    DuplicateMapping {
        /// The source-local revision number that was recorded twice.
        local: u64,
        /// The merged revision number it already maps to.
        existing: u64,
    },

    /// No mapping exists for this source revision.
    #[error("no merged revision recorded for source revision {local}")]
    UnmappedRevision {
        /// The source-local revision number that failed to resolve.
        local: u64,
    },
}

/// Mapping from a source's local revision numbers to the merged revision
/// numbers they were assigned.
///
/// Entries are immutable once recorded: [`RevisionMap::record`] refuses to
/// overwrite.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevisionMap {
    entries: BTreeMap<u64, u64>,
}

impl RevisionMap {
    /// Create an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Record that source revision `local` was merged as revision `merged`.
    ///
    /// # Errors
    /// [`RevMapError::DuplicateMapping`] if `local` already has an entry.
    pub fn record(&mut self, local: u64, merged: u64) -> Result<(), RevMapError> {
        if let Some(&existing) = self.entries.get(&local) {
            return Err(RevMapError::DuplicateMapping { local, existing });
        }
        self.entries.insert(local, merged);
        Ok(())
    }

    /// Look up the merged revision number assigned to source revision
    /// `local`.
    ///
    /// # Errors
    /// [`RevMapError::UnmappedRevision`] if no entry exists.
    pub fn resolve(&self, local: u64) -> Result<u64, RevMapError> {
        self.entries
            .get(&local)
            .copied()
            .ok_or(RevMapError::UnmappedRevision { local })
    }

    /// Number of recorded mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(local, merged)` pairs in increasing local order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().map(|(&local, &merged)| (local, merged))
    }
}
