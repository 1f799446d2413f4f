//! Per-source merge state.
//!
//! Wraps one [`SourceHistory`](super::SourceHistory) together with the
//! scheduler-owned state attached to it: the timestamp list fetched once at
//! initialization, the cursor to the next pending local revision, and the
//! source's own [`RevisionMap`].

use chrono::{DateTime, Utc};

use crate::revmap::{RevMapError, RevisionMap};

/// One source's cursor through its own history.
///
/// `next_rev` starts at 1 and only ever advances; the source is exhausted
/// once it moves past the end of the timestamp list. The revision map is
/// private to this source — no other source ever reads or writes it.
#[derive(Debug)]
pub(crate) struct SourceState<S> {
    history: S,
    name: String,
    timestamps: Vec<DateTime<Utc>>,
    next_rev: u64,
    map: RevisionMap,
    namespace_revision: u64,
}

impl<S> SourceState<S> {
    pub(crate) fn new(history: S, name: String, timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            history,
            name,
            timestamps,
            next_rev: 1,
            map: RevisionMap::new(),
            namespace_revision: 0,
        }
    }

    pub(crate) const fn history(&self) -> &S {
        &self.history
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// The local revision number the cursor points at.
    pub(crate) const fn next_rev(&self) -> u64 {
        self.next_rev
    }

    /// Timestamp of the next pending revision, or `None` once exhausted.
    pub(crate) fn next_timestamp(&self) -> Option<DateTime<Utc>> {
        let idx = usize::try_from(self.next_rev).ok()?.checked_sub(1)?;
        self.timestamps.get(idx).copied()
    }

    pub(crate) const fn map(&self) -> &RevisionMap {
        &self.map
    }

    /// Record the mapping for the revision just merged and advance the
    /// cursor past it.
    pub(crate) fn record_merged(&mut self, local: u64, merged: u64) -> Result<(), RevMapError> {
        self.map.record(local, merged)?;
        self.next_rev += 1;
        Ok(())
    }

    /// Number of revisions merged from this source so far.
    pub(crate) const fn merged_count(&self) -> u64 {
        self.next_rev - 1
    }

    pub(crate) const fn namespace_revision(&self) -> u64 {
        self.namespace_revision
    }

    pub(crate) const fn set_namespace_revision(&mut self, rev: u64) {
        self.namespace_revision = rev;
    }
}
