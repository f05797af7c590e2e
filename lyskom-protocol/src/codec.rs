//! Encoder and decoder for the Protocol A byte stream.

use crate::buffer::StreamBuffer;
use crate::call::Call;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::request::Request;
use crate::wire::put_hollerith;
use crate::HANDSHAKE_REPLY;
use bytes::{BufMut, BytesMut};

/// Serialises outgoing lines.
pub struct Encoder;

impl Encoder {
    /// Encodes `A<hollerith user>\n`.
    pub fn encode_handshake(user: &[u8]) -> BytesMut {
        let mut out = BytesMut::with_capacity(user.len() + 8);
        out.put_u8(b'A');
        put_hollerith(&mut out, user);
        out.put_u8(b'\n');
        out
    }

    pub fn encode_request(ref_no: u32, request: &Request) -> BytesMut {
        let mut out = BytesMut::with_capacity(64);
        request.encode(ref_no, &mut out);
        out
    }
}

/// Incremental frame decoder.
///
/// Feed it bytes as they arrive; each `decode_*` call either yields a
/// complete item or `None` with the buffer untouched.
pub struct Decoder {
    buffer: StreamBuffer,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: StreamBuffer::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: StreamBuffer::with_capacity(capacity),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Attempts to decode the next frame.
    ///
    /// Returns `Ok(None)` if more data is needed and `Err` on framing errors,
    /// after which the stream cannot be resynchronised.
    pub fn decode_frame<F>(&mut self, lookup: F) -> Result<Option<Frame>, ProtocolError>
    where
        F: Fn(u32) -> Option<Call>,
    {
        let mark = self.buffer.mark();
        match Frame::parse(&mut self.buffer, lookup) {
            Ok(frame) => {
                self.buffer.commit();
                Ok(Some(frame))
            }
            Err(ProtocolError::Incomplete) => {
                self.buffer.reset(mark);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Waits for the server's `LysKOM\n` greeting.
    ///
    /// Returns `Ok(true)` once it has been consumed and `Ok(false)` while it
    /// is still incomplete.
    pub fn decode_handshake(&mut self) -> Result<bool, ProtocolError> {
        let unread = self.buffer.unread();
        let n = unread.len().min(HANDSHAKE_REPLY.len());
        if unread[..n] != HANDSHAKE_REPLY[..n] {
            let shown = String::from_utf8_lossy(&unread[..n]).into_owned();
            return Err(ProtocolError::BadHandshake(shown));
        }
        if n < HANDSHAKE_REPLY.len() {
            return Ok(false);
        }
        self.buffer.take(n)?;
        self.buffer.commit();
        Ok(true)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.remaining()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
