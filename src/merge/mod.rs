//! The chronological merge scheduler.
//!
//! Owns the Global Counter and one cursor per source, and drives the whole
//! run: fetch every source's timestamp list, create one namespace per
//! source, then repeatedly pick the source whose next pending revision has
//! the earliest timestamp, rewrite that revision, and load it into the
//! destination. Everything is strictly sequential — the destination's
//! revision numbering only makes sense if revisions arrive one at a time in
//! counter order.
//!
//! The scheduler never talks to Subversion directly. It programs against
//! the [`SourceHistory`] and [`Destination`] traits; the real subprocess
//! implementations live in [`crate::svn`], and tests substitute in-memory
//! fakes.

mod source;


use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::dump::{DumpError, rewrite_dump};
use crate::revmap::RevMapError;
use source::SourceState;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// One independent source history to be merged.
///
/// # Key Invariants
///
/// - **Fixed history**: the revision sequence is already committed and does
///   not change during a run; `revision_timestamps` is fetched exactly once.
/// - **Self-contained fetches**: `revision_dump` returns exactly one
///   revision block (plus stream preamble), never a span of revisions.
#[allow(clippy::missing_errors_doc)]
pub trait SourceHistory {
    /// The error type returned by source operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short identifier for this source; becomes its destination namespace.
    fn name(&self) -> &str;

    /// Commit timestamps for every revision, index 0 = revision 1.
    fn revision_timestamps(&self) -> Result<Vec<DateTime<Utc>>, Self::Error>;

    /// The serialized dump of one revision.
    fn revision_dump(&self, rev: u64) -> Result<Vec<u8>, Self::Error>;
}

/// The combined repository that merged revisions are committed into.
///
/// The destination's own revision numbering must stay in lock-step with the
/// scheduler's Global Counter: its Nth commit (namespace creations
/// included) corresponds to counter value N.
#[allow(clippy::missing_errors_doc)]
pub trait Destination {
    /// The error type returned by destination operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create the container directory for one source. Called once per
    /// source, before any revision is merged; each call commits one
    /// destination revision.
    fn create_namespace(&mut self, name: &str) -> Result<(), Self::Error>;

    /// Commit one rewritten revision under the given namespace.
    fn load_revision(&mut self, namespace: &str, dump: &[u8]) -> Result<(), Self::Error>;

    /// The destination's youngest committed revision number. Used only for
    /// lock-step verification.
    fn committed_revision(&self) -> Result<u64, Self::Error>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that abort a merge run.
///
/// None of these are retried: the destination keeps whatever was committed
/// before the failure, and the caller must diagnose before attempting a
/// fresh run.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Two sources would occupy the same destination namespace.
    #[error("duplicate namespace `{name}`: source directories must have distinct final path components")]
    DuplicateNamespace {
        /// The colliding namespace name.
        name: String,
    },

    /// A source collaborator operation failed.
    #[error("source `{source}` failed")]
    Source {
        /// The source's namespace name.
        source: String,
        /// The underlying collaborator error.
        #[source]
        err: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A destination collaborator operation failed.
    #[error("destination failed")]
    Destination {
        /// The underlying collaborator error.
        #[source]
        err: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Rewriting a fetched revision failed.
    #[error("failed to rewrite revision {revision} of source `{source}`")]
    Rewrite {
        /// The source's namespace name.
        source: String,
        /// The source-local revision number being rewritten.
        revision: u64,
        /// The parse/rewrite failure.
        #[source]
        err: DumpError,
    },

    /// Recording a new mapping failed — a scheduling bug, not a data error.
    #[error("scheduling bug while recording revision {revision} of source `{source}`")]
    Record {
        /// The source's namespace name.
        source: String,
        /// The source-local revision number being recorded.
        revision: u64,
        /// The map's refusal.
        #[source]
        err: RevMapError,
    },

    /// Lock-step verification found the destination out of step with the
    /// Global Counter.
    #[error("destination is at revision {committed} but the merge counter is at {counter}")]
    CounterDrift {
        /// The destination's youngest committed revision.
        committed: u64,
        /// The scheduler's Global Counter value.
        counter: u64,
    },
}

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

/// Tunable behavior for one merge run.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions {
    /// After every commit (namespace creations included), check that the
    /// destination's youngest revision equals the Global Counter.
    pub verify_destination: bool,
}

/// One `local → merged` assignment, as recorded in a source's revision map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RevisionMapping {
    /// Source-local revision number.
    pub local: u64,
    /// Merged revision number it was assigned.
    pub merged: u64,
}

/// Per-source outcome of a completed run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    /// The source's namespace name.
    pub name: String,
    /// The destination revision that created this source's namespace.
    pub namespace_revision: u64,
    /// How many revisions were merged from this source.
    pub revisions_merged: u64,
    /// The complete local→merged mapping, in increasing local order.
    pub mapping: Vec<RevisionMapping>,
}

/// Outcome of a completed merge run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Revisions merged across all sources (namespace creations excluded).
    pub revisions_merged: u64,
    /// The final Global Counter value — the destination's youngest
    /// revision after the run.
    pub final_revision: u64,
    /// Per-source details, in configured source order.
    pub sources: Vec<SourceReport>,
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// Run phase. Strictly forward: `Initializing → Merging → Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Initializing,
    Merging,
    Done,
}

/// The merge scheduler.
///
/// Exclusively owns the Global Counter and every source's cursor and
/// revision map. A `Merger` performs exactly one run: [`Merger::run`]
/// consumes it.
pub struct Merger<S: SourceHistory, D: Destination> {
    sources: Vec<SourceState<S>>,
    destination: D,
    options: MergeOptions,
    counter: u64,
    phase: Phase,
}

impl<S: SourceHistory, D: Destination> Merger<S, D> {
    /// Prepare a merge of `sources` (in tie-break priority order) into
    /// `destination`.
    ///
    /// # Errors
    /// [`MergeError::DuplicateNamespace`] if two sources share a name;
    /// [`MergeError::Source`] if fetching a timestamp list fails.
    pub fn new(
        sources: Vec<S>,
        destination: D,
        options: MergeOptions,
    ) -> Result<Self, MergeError> {
        for (i, source) in sources.iter().enumerate() {
            if sources[..i].iter().any(|s| s.name() == source.name()) {
                return Err(MergeError::DuplicateNamespace {
                    name: source.name().to_owned(),
                });
            }
        }

        // Each source's history is fixed for the whole run; fetch its
        // timestamp list exactly once, up front.
        let mut states = Vec::with_capacity(sources.len());
        for source in sources {
            let timestamps = source
                .revision_timestamps()
                .map_err(|err| MergeError::Source {
                    source: source.name().to_owned(),
                    err: Box::new(err),
                })?;
            let name = source.name().to_owned();
            debug!(source = %name, revisions = timestamps.len(), "listed source history");
            states.push(SourceState::new(source, name, timestamps));
        }

        Ok(Self {
            sources: states,
            destination,
            options,
            counter: 0,
            phase: Phase::Initializing,
        })
    }

    /// Execute the full run: create namespaces, merge every revision in
    /// chronological order, and return the report.
    ///
    /// # Errors
    /// The first [`MergeError`] encountered; the run does not resume.
    pub fn run(mut self) -> Result<MergeReport, MergeError> {
        self.create_namespaces()?;

        self.phase = Phase::Merging;
        while let Some(idx) = self.select_next() {
            self.merge_one(idx)?;
        }

        self.phase = Phase::Done;
        info!(
            revisions = self.counter,
            sources = self.sources.len(),
            "merge complete"
        );
        Ok(self.report())
    }

    /// Initializing phase: one namespace (and one counter value) per
    /// source, in configured order.
    fn create_namespaces(&mut self) -> Result<(), MergeError> {
        debug_assert_eq!(self.phase, Phase::Initializing);
        for state in &mut self.sources {
            self.counter += 1;
            info!(
                namespace = %state.name(),
                revision = self.counter,
                "creating destination namespace"
            );
            self.destination
                .create_namespace(state.name())
                .map_err(|err| MergeError::Destination { err: Box::new(err) })?;
            state.set_namespace_revision(self.counter);
            verify_lock_step(&self.destination, self.counter, self.options)?;
        }
        Ok(())
    }

    /// Pick the non-exhausted source with the earliest next timestamp.
    ///
    /// Ties break toward the earliest position in the configured source
    /// order (strict `<` during a forward scan), which keeps the merged
    /// ordering deterministic for identical inputs.
    fn select_next(&self) -> Option<usize> {
        let mut best: Option<(usize, DateTime<Utc>)> = None;
        for (idx, state) in self.sources.iter().enumerate() {
            let Some(ts) = state.next_timestamp() else {
                continue;
            };
            match best {
                Some((_, best_ts)) if ts >= best_ts => {}
                _ => best = Some((idx, ts)),
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Merging phase, one step: fetch, rewrite, record, advance, load.
    fn merge_one(&mut self, idx: usize) -> Result<(), MergeError> {
        self.counter += 1;
        let merged_rev = self.counter;

        let state = &mut self.sources[idx];
        let local_rev = state.next_rev();
        info!(
            source = %state.name(),
            local = local_rev,
            merged = merged_rev,
            "taking next revision"
        );

        let raw = state
            .history()
            .revision_dump(local_rev)
            .map_err(|err| MergeError::Source {
                source: state.name().to_owned(),
                err: Box::new(err),
            })?;

        let mut rewritten = Vec::with_capacity(raw.len());
        rewrite_dump(&raw, &mut rewritten, state.map(), merged_rev).map_err(|err| {
            MergeError::Rewrite {
                source: state.name().to_owned(),
                revision: local_rev,
                err,
            }
        })?;

        state
            .record_merged(local_rev, merged_rev)
            .map_err(|err| MergeError::Record {
                source: state.name().to_owned(),
                revision: local_rev,
                err,
            })?;
        let namespace = state.name().to_owned();

        self.destination
            .load_revision(&namespace, &rewritten)
            .map_err(|err| MergeError::Destination { err: Box::new(err) })?;
        verify_lock_step(&self.destination, self.counter, self.options)?;
        Ok(())
    }

    fn report(&self) -> MergeReport {
        let sources: Vec<SourceReport> = self
            .sources
            .iter()
            .map(|state| SourceReport {
                name: state.name().to_owned(),
                namespace_revision: state.namespace_revision(),
                revisions_merged: state.merged_count(),
                mapping: state
                    .map()
                    .iter()
                    .map(|(local, merged)| RevisionMapping { local, merged })
                    .collect(),
            })
            .collect();
        MergeReport {
            revisions_merged: sources.iter().map(|s| s.revisions_merged).sum(),
            final_revision: self.counter,
            sources,
        }
    }
}

/// When enabled, fail unless the destination's youngest revision matches
/// the Global Counter.
fn verify_lock_step<D: Destination>(
    destination: &D,
    counter: u64,
    options: MergeOptions,
) -> Result<(), MergeError> {
    if !options.verify_destination {
        return Ok(());
    }
    let committed = destination
        .committed_revision()
        .map_err(|err| MergeError::Destination { err: Box::new(err) })?;
    if committed == counter {
        Ok(())
    } else {
        Err(MergeError::CounterDrift { committed, counter })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::convert::Infallible;
    use std::rc::Rc;

    use chrono::TimeZone;

    use super::*;

    fn ts(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, min, 0).unwrap()
    }

    /// Minimal single-revision dump, enough for the rewriter to chew on.
    fn tiny_dump(rev: u64) -> Vec<u8> {
        let props = b"PROPS-END\n";
        let mut out = Vec::from(&b"SVN-fs-dump-format-version: 2\n\n"[..]);
        out.extend_from_slice(format!("Revision-number: {rev}\n").as_bytes());
        out.extend_from_slice(format!("Prop-content-length: {}\n", props.len()).as_bytes());
        out.extend_from_slice(format!("Content-length: {}\n", props.len()).as_bytes());
        out.extend_from_slice(b"\n");
        out.extend_from_slice(props);
        out.extend_from_slice(b"\n");
        out
    }

    struct FakeSource {
        name: String,
        timestamps: Vec<DateTime<Utc>>,
    }

    impl SourceHistory for FakeSource {
        type Error = Infallible;

        fn name(&self) -> &str {
            &self.name
        }

        fn revision_timestamps(&self) -> Result<Vec<DateTime<Utc>>, Infallible> {
            Ok(self.timestamps.clone())
        }

        fn revision_dump(&self, rev: u64) -> Result<Vec<u8>, Infallible> {
            Ok(tiny_dump(rev))
        }
    }

    /// Records every commit; `committed` is shared so tests can inspect it
    /// after `run()` consumes the merger.
    #[derive(Clone, Default)]
    struct FakeDestination {
        committed: Rc<RefCell<Vec<String>>>,
        lie_about_youngest: bool,
    }

    impl Destination for FakeDestination {
        type Error = Infallible;

        fn create_namespace(&mut self, name: &str) -> Result<(), Infallible> {
            self.committed.borrow_mut().push(format!("mkdir {name}"));
            Ok(())
        }

        fn load_revision(&mut self, namespace: &str, _dump: &[u8]) -> Result<(), Infallible> {
            self.committed.borrow_mut().push(format!("load {namespace}"));
            Ok(())
        }

        fn committed_revision(&self) -> Result<u64, Infallible> {
            let real = self.committed.borrow().len() as u64;
            Ok(if self.lie_about_youngest { real + 7 } else { real })
        }
    }

    fn src(name: &str, minutes: &[u32]) -> FakeSource {
        FakeSource {
            name: name.to_owned(),
            timestamps: minutes.iter().map(|&m| ts(m)).collect(),
        }
    }

    #[test]
    fn interleaves_sources_chronologically() {
        // Spec scenario: A at [10:00, 10:10], B at [10:05].
        let dest = FakeDestination::default();
        let committed = Rc::clone(&dest.committed);
        let merger = Merger::new(
            vec![src("a", &[0, 10]), src("b", &[5])],
            dest,
            MergeOptions::default(),
        )
        .unwrap();
        let report = merger.run().unwrap();

        assert_eq!(
            *committed.borrow(),
            vec!["mkdir a", "mkdir b", "load a", "load b", "load a"]
        );
        assert_eq!(report.final_revision, 5);
        assert_eq!(report.revisions_merged, 3);
        assert_eq!(report.sources[0].namespace_revision, 1);
        assert_eq!(report.sources[1].namespace_revision, 2);
        assert_eq!(
            report.sources[0].mapping,
            vec![
                RevisionMapping { local: 1, merged: 3 },
                RevisionMapping { local: 2, merged: 5 }
            ]
        );
        assert_eq!(
            report.sources[1].mapping,
            vec![RevisionMapping { local: 1, merged: 4 }]
        );
    }

    #[test]
    fn equal_timestamps_break_toward_configured_order() {
        let dest = FakeDestination::default();
        let committed = Rc::clone(&dest.committed);
        let merger = Merger::new(
            vec![src("first", &[5]), src("second", &[5])],
            dest,
            MergeOptions::default(),
        )
        .unwrap();
        merger.run().unwrap();

        assert_eq!(
            *committed.borrow(),
            vec!["mkdir first", "mkdir second", "load first", "load second"]
        );
    }

    #[test]
    fn zero_revision_source_contributes_only_namespace() {
        let dest = FakeDestination::default();
        let committed = Rc::clone(&dest.committed);
        let merger = Merger::new(
            vec![src("empty", &[]), src("busy", &[1])],
            dest,
            MergeOptions::default(),
        )
        .unwrap();
        let report = merger.run().unwrap();

        assert_eq!(*committed.borrow(), vec!["mkdir empty", "mkdir busy", "load busy"]);
        assert_eq!(report.sources[0].revisions_merged, 0);
        assert!(report.sources[0].mapping.is_empty());
        assert_eq!(report.final_revision, 3);
    }

    #[test]
    fn no_sources_is_an_empty_run() {
        let merger = Merger::new(
            Vec::<FakeSource>::new(),
            FakeDestination::default(),
            MergeOptions::default(),
        )
        .unwrap();
        let report = merger.run().unwrap();
        assert_eq!(report, MergeReport::default());
    }

    #[test]
    fn duplicate_namespace_rejected_up_front() {
        let err = Merger::new(
            vec![src("same", &[1]), src("same", &[2])],
            FakeDestination::default(),
            MergeOptions::default(),
        )
        .err()
        .expect("duplicate names must be rejected");
        assert!(matches!(err, MergeError::DuplicateNamespace { name } if name == "same"));
    }

    #[test]
    fn verification_passes_for_honest_destination() {
        let merger = Merger::new(
            vec![src("a", &[0, 2]), src("b", &[1])],
            FakeDestination::default(),
            MergeOptions {
                verify_destination: true,
            },
        )
        .unwrap();
        let report = merger.run().unwrap();
        assert_eq!(report.final_revision, 5);
    }

    #[test]
    fn verification_catches_counter_drift() {
        let dest = FakeDestination {
            lie_about_youngest: true,
            ..FakeDestination::default()
        };
        let merger = Merger::new(
            vec![src("a", &[0])],
            dest,
            MergeOptions {
                verify_destination: true,
            },
        )
        .unwrap();
        let err = merger.run().unwrap_err();
        assert!(matches!(err, MergeError::CounterDrift { counter: 1, .. }));
    }

    #[test]
    fn select_next_skips_exhausted_sources() {
        let merger = Merger::new(
            vec![src("empty", &[]), src("busy", &[3])],
            FakeDestination::default(),
            MergeOptions::default(),
        )
        .unwrap();
        assert_eq!(merger.select_next(), Some(1));
    }

    #[test]
    fn select_next_none_when_all_exhausted() {
        let merger = Merger::new(
            vec![src("a", &[]), src("b", &[])],
            FakeDestination::default(),
            MergeOptions::default(),
        )
        .unwrap();
        assert_eq!(merger.select_next(), None);
    }

    #[test]
    fn report_serializes_to_json() {
        let merger = Merger::new(
            vec![src("a", &[0])],
            FakeDestination::default(),
            MergeOptions::default(),
        )
        .unwrap();
        let report = merger.run().unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"final_revision\":2"));
        assert!(json.contains("\"name\":\"a\""));
    }
}
