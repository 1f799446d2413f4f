//! The order-preserving header block.
//!
//! A header block is a run of `Name: value` lines terminated by one blank
//! line. Output order must match input order — which is why storage is an
//! association list rather than a hash map — and names are unique within a
//! block. Values are kept as raw bytes: node paths are not guaranteed to be
//! UTF-8 and must survive the round trip unchanged.

use std::io::Write;

use super::DumpError;
use super::cursor::DumpCursor;

/// The revision header field that gets renumbered.
pub const REVISION_NUMBER: &str = "Revision-number";
/// The node header field identifying the changed path.
pub const NODE_PATH: &str = "Node-path";
/// The node header field referencing the copy-source revision.
pub const NODE_COPYFROM_REV: &str = "Node-copyfrom-rev";
/// Declared byte length of a property payload.
pub const PROP_CONTENT_LENGTH: &str = "Prop-content-length";
/// Declared byte length of a text (content) payload.
pub const TEXT_CONTENT_LENGTH: &str = "Text-content-length";

/// One parsed header block.
///
/// Exactly two fields are ever mutated downstream ([`REVISION_NUMBER`] and
/// [`NODE_COPYFROM_REV`]); everything else passes through opaque.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderBlock {
    fields: Vec<(Vec<u8>, Vec<u8>)>,
}

impl HeaderBlock {
    /// Read a header block from `cursor`, consuming its terminating blank
    /// line.
    ///
    /// A header line splits at the first `:`; the value is everything after
    /// the first space that follows. Whatever comes after that space —
    /// further colons, leading-looking whitespace, arbitrary bytes — is the
    /// value, verbatim.
    ///
    /// # Errors
    /// [`DumpError::TruncatedStream`] if the stream ends before the blank
    /// line; [`DumpError::MalformedHeader`] if a line has no `": "`
    /// separator; [`DumpError::DuplicateField`] on a repeated name.
    pub fn read(cursor: &mut DumpCursor<'_>) -> Result<Self, DumpError> {
        let mut fields: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        loop {
            let line = match cursor.read_line() {
                Ok(line) => line,
                Err(DumpError::TruncatedStream { needed, available, .. }) => {
                    return Err(DumpError::TruncatedStream {
                        needed,
                        available,
                        context: "reading header lines",
                    });
                }
                Err(other) => return Err(other),
            };
            if line.is_empty() {
                return Ok(Self { fields });
            }
            let (name, value) = split_header_line(line)?;
            if fields.iter().any(|(existing, _)| existing == name) {
                return Err(DumpError::DuplicateField {
                    field: String::from_utf8_lossy(name).into_owned(),
                });
            }
            fields.push((name.to_vec(), value.to_vec()));
        }
    }

    /// Value of the field named `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(field, _)| field == name.as_bytes())
            .map(|(_, value)| value.as_slice())
    }

    /// Replace the value of `name` in place, preserving its position.
    ///
    /// Appends at the end if the field was absent (callers only set fields
    /// they have already observed, so in practice this replaces).
    pub fn set(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|(field, _)| field == name.as_bytes())
        {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name.as_bytes().to_vec(), value)),
        }
    }

    /// Parse the field named `name` as a `u64`, if present.
    ///
    /// # Errors
    /// [`DumpError::InvalidNumber`] if the value is present but not a
    /// non-negative integer.
    pub fn u64_field(&self, name: &'static str) -> Result<Option<u64>, DumpError> {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| DumpError::InvalidNumber {
                field: name,
                value: String::from_utf8_lossy(raw).into_owned(),
            })
    }

    /// Parse the field named `name` as a `u64`, failing if absent.
    ///
    /// # Errors
    /// [`DumpError::MissingField`] if absent, [`DumpError::InvalidNumber`]
    /// if unparsable.
    pub fn require_u64(&self, name: &'static str) -> Result<u64, DumpError> {
        self.u64_field(name)?
            .ok_or(DumpError::MissingField { field: name })
    }

    /// Write the block (all fields in original order) followed by its
    /// terminating blank line.
    ///
    /// # Errors
    /// Propagates writer failures.
    pub fn write<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for (name, value) in &self.fields {
            out.write_all(name)?;
            out.write_all(b": ")?;
            out.write_all(value)?;
            out.write_all(b"\n")?;
        }
        out.write_all(b"\n")
    }

    /// Number of fields in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` for a block with no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(name, value)` pairs in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_slice(), value.as_slice()))
    }
}

/// Split one header line into `(name, value)`.
///
/// The name ends at the first `:`; the value starts after the first space
/// that follows it. A line with neither is malformed.
fn split_header_line(line: &[u8]) -> Result<(&[u8], &[u8]), DumpError> {
    let malformed = || DumpError::MalformedHeader {
        line: String::from_utf8_lossy(line).into_owned(),
    };
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(malformed)?;
    let after_colon = &line[colon + 1..];
    let space = after_colon
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(malformed)?;
    Ok((&line[..colon], &after_colon[space + 1..]))
}
