//! Subversion dump-stream parsing and renumbering.
//!
//! A dump stream is a line-oriented/binary hybrid: structural regions are
//! `Field-Name: value` header lines terminated by a blank line, while
//! property and text payloads are opaque byte spans whose extents are
//! declared by length headers. The one correctness rule everything here is
//! built around: payloads are copied strictly by declared length and never
//! inspected — payload bytes may contain newlines, blank lines, or text
//! that looks exactly like a header marker.
//!
//! Module layout:
//! - [`cursor`] — sequential reading over one in-memory dump buffer.
//! - [`headers`] — the order-preserving header block.
//! - [`rewriter`] — the revision/node transformation itself.

pub mod cursor;
pub mod headers;
pub mod rewriter;

pub use cursor::DumpCursor;
pub use headers::HeaderBlock;
pub use rewriter::{rewrite_dump, rewrite_revision};

use thiserror::Error;

use crate::revmap::RevMapError;

/// Errors from dump-stream parsing and rewriting.
///
/// Every variant is fatal for the current merge run. The format has no
/// self-describing recovery point: once the parser and the stream disagree
/// about where a structural boundary is, resuming risks silently treating
/// payload bytes as structure (or vice versa), so nothing here is retried.
#[derive(Debug, Error)]
pub enum DumpError {
    /// A line in header position had no `": "` name/value separator.
    #[error("malformed header line: {line:?}")]
    MalformedHeader {
        /// The offending line, lossily decoded for display.
        line: String,
    },

    /// The same field name appeared twice within one header block.
    #[error("duplicate header field `{field}` within one block")]
    DuplicateField {
        /// The repeated field name.
        field: String,
    },

    /// End of stream where more structured or payload data was declared.
    #[error("truncated stream: needed {needed} more byte(s) while {context}, {available} available")]
    TruncatedStream {
        /// Bytes still required by the current structure.
        needed: usize,
        /// Bytes actually remaining in the stream.
        available: usize,
        /// What was being read when the stream ran out.
        context: &'static str,
    },

    /// The expected marker line was not found at a structural boundary.
    #[error("desynchronized stream: expected {expected} at byte offset {offset}, found {found:?}")]
    Desynchronized {
        /// The structure the parser expected next.
        expected: &'static str,
        /// The line actually found, lossily decoded for display.
        found: String,
        /// Byte offset of the unexpected line.
        offset: usize,
    },

    /// A numeric header field failed to parse as an unsigned integer.
    #[error("header `{field}` has a non-numeric value {value:?}")]
    InvalidNumber {
        /// The field whose value was expected to be numeric.
        field: &'static str,
        /// The raw value, lossily decoded for display.
        value: String,
    },

    /// A required field was absent from a revision header block.
    #[error("revision header is missing required field `{field}`")]
    MissingField {
        /// The missing field name.
        field: &'static str,
    },

    /// A copy-source reference could not be resolved through the source's
    /// revision map.
    #[error(transparent)]
    Map(#[from] RevMapError),

    /// Writing the rewritten stream failed.
    #[error("I/O error while writing rewritten dump")]
    Io(#[from] std::io::Error),
}
