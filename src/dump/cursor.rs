//! Sequential reading over one in-memory dump buffer.
//!
//! [`DumpCursor`] is the only thing that touches raw dump bytes. Header
//! regions are read line by line; payloads are copied by exact byte count.
//! Peeking never advances the cursor, so callers can test for a marker line
//! before committing to a structure.

use std::io::Write;

use super::DumpError;

/// A read position over one dump buffer.
///
/// Lines are `\n`-terminated; the terminator is not included in returned
/// slices. Payload copies are length-driven and ignore line structure
/// entirely.
#[derive(Debug)]
pub struct DumpCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DumpCursor<'a> {
    /// Create a cursor at the start of `buf`.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset from the start of the buffer.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Look at the next line without consuming it.
    ///
    /// Returns `None` only when the buffer is exhausted. If the final line
    /// lacks a terminating `\n`, the partial line is returned as-is — peeks
    /// are used for marker checks, where a truncated tail must still be
    /// comparable.
    #[must_use]
    pub fn peek_line(&self) -> Option<&'a [u8]> {
        if self.is_exhausted() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => Some(&rest[..nl]),
            None => Some(rest),
        }
    }

    /// Consume and return the next `\n`-terminated line (without the
    /// terminator).
    ///
    /// # Errors
    /// [`DumpError::TruncatedStream`] if the buffer is exhausted or the
    /// line has no terminating newline.
    pub fn read_line(&mut self) -> Result<&'a [u8], DumpError> {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        let Some(nl) = rest.iter().position(|&b| b == b'\n') else {
            return Err(DumpError::TruncatedStream {
                needed: 1,
                available: 0,
                context: "reading a line",
            });
        };
        self.pos += nl + 1;
        Ok(&rest[..nl])
    }

    /// Consume the next line and write it (with its newline) to `out`.
    ///
    /// # Errors
    /// [`DumpError::TruncatedStream`] on a missing line or terminator;
    /// [`DumpError::Io`] if the write fails.
    pub fn copy_line<W: Write>(&mut self, out: &mut W) -> Result<(), DumpError> {
        let line = self.read_line()?;
        out.write_all(line)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    /// Copy exactly `count` bytes to `out`, verbatim.
    ///
    /// The copied span is never inspected: it may contain newlines, blank
    /// lines, or bytes that happen to spell a header marker.
    ///
    /// # Errors
    /// [`DumpError::TruncatedStream`] if fewer than `count` bytes remain;
    /// [`DumpError::Io`] if the write fails.
    pub fn copy_exact<W: Write>(
        &mut self,
        out: &mut W,
        count: usize,
        context: &'static str,
    ) -> Result<(), DumpError> {
        if count > self.remaining() {
            return Err(DumpError::TruncatedStream {
                needed: count,
                available: self.remaining(),
                context,
            });
        }
        out.write_all(&self.buf[self.pos..self.pos + count])?;
        self.pos += count;
        Ok(())
    }
}
