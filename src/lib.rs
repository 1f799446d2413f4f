//! svnmeld library crate — re-exports for integration tests.
//!
//! The primary interface is the `svnmeld` binary. This lib.rs exposes the
//! internal modules so that integration tests can exercise the dump
//! rewriter, the merge scheduler, and the revision map directly without
//! going through the CLI or a real Subversion installation.

pub mod config;
pub mod dump;
pub mod merge;
pub mod revmap;
pub mod svn;
pub mod telemetry;

pub use dump::DumpError;
pub use merge::{Destination, MergeError, MergeOptions, MergeReport, Merger, SourceHistory};
pub use revmap::{RevMapError, RevisionMap};
