//! The revision-block rewriter.
//!
//! Takes one serialized revision (as produced by `svnadmin dump
//! --incremental -r N`) and emits an equivalent block with the revision
//! number replaced and every `Node-copyfrom-rev` resolved through the
//! source's revision map. Headers are the only region that is parsed;
//! property and text payloads pass through byte-exact, driven purely by
//! their declared lengths.

use std::io::Write;

use tracing::info;

use super::DumpError;
use super::cursor::DumpCursor;
use super::headers::{
    HeaderBlock, NODE_COPYFROM_REV, NODE_PATH, PROP_CONTENT_LENGTH, REVISION_NUMBER,
    TEXT_CONTENT_LENGTH,
};
use crate::revmap::RevisionMap;

/// Marker line prefix opening a revision block.
const REVISION_MARKER: &[u8] = b"Revision-number: ";
/// Marker line prefix opening a node block.
const NODE_MARKER: &[u8] = b"Node-path: ";

/// Rewrite one fetched dump: preamble, then exactly one revision block.
///
/// The preamble (format version, UUID, any stream-level metadata) is copied
/// through unexamined up to the first revision marker. A fetched dump is
/// self-contained and holds a single revision; if more data follows the
/// rewritten block, the fetch collaborator and this parser disagree about
/// framing and the run must stop — renumbering a second block with the same
/// target number would corrupt the destination silently.
///
/// # Errors
/// Any [`DumpError`]; all are fatal for the run.
pub fn rewrite_dump<W: Write>(
    input: &[u8],
    out: &mut W,
    map: &RevisionMap,
    merged_rev: u64,
) -> Result<(), DumpError> {
    let mut cursor = DumpCursor::new(input);
    loop {
        match cursor.peek_line() {
            None => {
                return Err(DumpError::TruncatedStream {
                    needed: 1,
                    available: 0,
                    context: "scanning for the first revision header",
                });
            }
            Some(line) if line.starts_with(REVISION_MARKER) => break,
            Some(_) => cursor.copy_line(out)?,
        }
    }
    rewrite_revision(&mut cursor, out, map, merged_rev)?;
    if let Some(line) = cursor.peek_line() {
        return Err(DumpError::Desynchronized {
            expected: "end of stream after the revision block",
            found: String::from_utf8_lossy(line).into_owned(),
            offset: cursor.position(),
        });
    }
    Ok(())
}

/// Rewrite a single revision block starting at the cursor.
///
/// The cursor must sit exactly at a `Revision-number:` line — anything
/// else means parser and stream have desynchronized, which is
/// unrecoverable without re-parsing from scratch. Returns the number of
/// input bytes consumed.
///
/// # Errors
/// Any [`DumpError`]; all are fatal for the run.
pub fn rewrite_revision<W: Write>(
    cursor: &mut DumpCursor<'_>,
    out: &mut W,
    map: &RevisionMap,
    merged_rev: u64,
) -> Result<usize, DumpError> {
    let start = cursor.position();
    expect_marker(cursor, REVISION_MARKER, "a revision header")?;

    let mut headers = HeaderBlock::read(cursor)?;
    headers.set(REVISION_NUMBER, merged_rev.to_string());
    headers.write(out)?;

    let prop_len = payload_len(PROP_CONTENT_LENGTH, headers.require_u64(PROP_CONTENT_LENGTH)?)?;
    cursor.copy_exact(out, prop_len, "copying revision properties")?;
    // The single separator line that follows the revision properties.
    cursor.copy_line(out)?;

    loop {
        let Some(line) = cursor.peek_line() else { break };
        if line.starts_with(REVISION_MARKER) {
            break;
        }
        if !line.starts_with(NODE_MARKER) {
            return Err(DumpError::Desynchronized {
                expected: "a node header",
                found: String::from_utf8_lossy(line).into_owned(),
                offset: cursor.position(),
            });
        }
        rewrite_node(cursor, out, map)?;
    }

    Ok(cursor.position() - start)
}

/// Rewrite one node block: headers (with copy-source resolution), then the
/// declared payload spans, then any trailing blank padding lines.
fn rewrite_node<W: Write>(
    cursor: &mut DumpCursor<'_>,
    out: &mut W,
    map: &RevisionMap,
) -> Result<(), DumpError> {
    let mut headers = HeaderBlock::read(cursor)?;

    if let Some(raw) = headers.get(NODE_COPYFROM_REV) {
        let local = std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| DumpError::InvalidNumber {
                field: NODE_COPYFROM_REV,
                value: String::from_utf8_lossy(raw).into_owned(),
            })?;
        let merged = map.resolve(local)?;
        let path = headers
            .get(NODE_PATH)
            .map_or_else(String::new, |p| String::from_utf8_lossy(p).into_owned());
        info!(%path, from = local, to = merged, "rewrote copy-source revision");
        headers.set(NODE_COPYFROM_REV, merged.to_string());
    }

    headers.write(out)?;

    // Property and text payloads are back-to-back verbatim spans; their
    // boundary exists only in the declared lengths.
    if let Some(len) = headers.u64_field(PROP_CONTENT_LENGTH)? {
        cursor.copy_exact(out, payload_len(PROP_CONTENT_LENGTH, len)?, "copying node properties")?;
    }
    if let Some(len) = headers.u64_field(TEXT_CONTENT_LENGTH)? {
        cursor.copy_exact(out, payload_len(TEXT_CONTENT_LENGTH, len)?, "copying node content")?;
    }

    // Blank padding lines between blocks are format, not content; pass
    // them through unchanged.
    while cursor.peek_line().is_some_and(<[u8]>::is_empty) {
        cursor.copy_line(out)?;
    }

    Ok(())
}

/// Narrow a declared payload length to this platform's address width.
fn payload_len(field: &'static str, value: u64) -> Result<usize, DumpError> {
    usize::try_from(value).map_err(|_| DumpError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Fail with [`DumpError::Desynchronized`] unless the next line starts
/// with `marker`.
fn expect_marker(
    cursor: &DumpCursor<'_>,
    marker: &[u8],
    expected: &'static str,
) -> Result<(), DumpError> {
    match cursor.peek_line() {
        Some(line) if line.starts_with(marker) => Ok(()),
        Some(line) => Err(DumpError::Desynchronized {
            expected,
            found: String::from_utf8_lossy(line).into_owned(),
            offset: cursor.position(),
        }),
        None => Err(DumpError::TruncatedStream {
            needed: marker.len(),
            available: 0,
            context: "reading a revision header",
        }),
    }
}
