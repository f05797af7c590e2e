//! Receive buffer with a read cursor.
//!
//! Bytes arrive in arbitrary chunks. A parse attempt reads through the cursor
//! from a [`Mark`]; if it runs out of bytes the cursor is reset to the mark and
//! the attempt is repeated once more data has been appended. Bytes before the
//! cursor are only released by [`StreamBuffer::commit`], so a failed attempt
//! never loses or copies data.

use crate::error::ProtocolError;
use bytes::{Buf, Bytes, BytesMut};

/// Default initial capacity (8 KiB).
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// A saved cursor position.
///
/// Only valid until the next [`StreamBuffer::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

/// Growable byte buffer with a read cursor.
#[derive(Debug)]
pub struct StreamBuffer {
    buf: BytesMut,
    pos: usize,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Creates a buffer pre-filled with `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buffer = Self::with_capacity(data.len());
        buffer.extend(data);
        buffer
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The bytes after the cursor.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub fn mark(&self) -> Mark {
        Mark(self.pos)
    }

    pub fn reset(&mut self, mark: Mark) {
        debug_assert!(mark.0 <= self.buf.len());
        self.pos = mark.0;
    }

    /// Drops everything before the cursor. Invalidates outstanding marks.
    pub fn commit(&mut self) {
        self.buf.advance(self.pos);
        self.pos = 0;
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    pub fn peek(&self) -> Result<u8, ProtocolError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(ProtocolError::Incomplete)
    }

    pub fn next_byte(&mut self) -> Result<u8, ProtocolError> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    /// Skips whitespace and returns the next byte without consuming it.
    pub fn peek_non_ws(&mut self) -> Result<u8, ProtocolError> {
        loop {
            let byte = self.peek()?;
            if !is_whitespace(byte) {
                return Ok(byte);
            }
            self.pos += 1;
        }
    }

    /// Skips whitespace and consumes the next byte.
    pub fn next_non_ws(&mut self) -> Result<u8, ProtocolError> {
        let byte = self.peek_non_ws()?;
        self.pos += 1;
        Ok(byte)
    }

    /// Consumes exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::Incomplete);
        }
        let bytes = Bytes::copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(bytes)
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\n' | b'\r' | b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_reset() {
        let mut buf = StreamBuffer::from_slice(b"abc");
        let mark = buf.mark();
        assert_eq!(buf.next_byte().unwrap(), b'a');
        assert_eq!(buf.next_byte().unwrap(), b'b');
        buf.reset(mark);
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.unread(), b"abc");
    }

    #[test]
    fn test_incomplete_take() {
        let mut buf = StreamBuffer::from_slice(b"ab");
        assert!(buf.take(3).unwrap_err().is_incomplete());
        // A failed take leaves the cursor alone
        assert_eq!(buf.remaining(), 2);
        buf.extend(b"c");
        assert_eq!(&buf.take(3).unwrap()[..], b"abc");
    }

    #[test]
    fn test_commit_releases_consumed_bytes() {
        let mut buf = StreamBuffer::from_slice(b"hello world");
        buf.take(6).unwrap();
        buf.commit();
        assert_eq!(buf.unread(), b"world");
        assert_eq!(buf.mark(), Mark(0));
    }

    #[test]
    fn test_whitespace_skipping() {
        let mut buf = StreamBuffer::from_slice(b" \n\t x");
        assert_eq!(buf.peek_non_ws().unwrap(), b'x');
        assert_eq!(buf.next_non_ws().unwrap(), b'x');
        assert!(buf.next_non_ws().unwrap_err().is_incomplete());
    }

    #[test]
    fn test_clear() {
        let mut buf = StreamBuffer::from_slice(b"data");
        buf.next_byte().unwrap();
        buf.clear();
        assert_eq!(buf.remaining(), 0);
    }
}
