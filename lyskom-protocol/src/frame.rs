//! Incoming frames.
//!
//! ```text
//! =<ref_no> <reply body>              ok reply
//! %<ref_no> <error_code> <detail>     error reply
//! :<arg_count> <msg_no> <body>        async message
//! ```

use crate::async_message::AsyncMessage;
use crate::buffer::StreamBuffer;
use crate::call::{Call, Reply};
use crate::error::{ErrorCode, ProtocolError};
use crate::wire::read_int;

/// One parsed frame from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ok {
        ref_no: u32,
        reply: Reply,
    },
    Error {
        ref_no: u32,
        code: ErrorCode,
        detail: u32,
    },
    Async(AsyncMessage),
}

impl Frame {
    /// Parses one frame from the buffer cursor.
    ///
    /// `lookup` resolves a ref_no to the call it was sent with; a ref_no it
    /// does not know is a protocol violation. Returns
    /// [`ProtocolError::Incomplete`] if the frame is not fully buffered yet,
    /// in which case the cursor position is unspecified and the caller must
    /// reset to its mark.
    pub fn parse<F>(buf: &mut StreamBuffer, lookup: F) -> Result<Frame, ProtocolError>
    where
        F: Fn(u32) -> Option<Call>,
    {
        match buf.next_non_ws()? {
            b'=' => {
                let ref_no = read_int(buf)?;
                let call = lookup(ref_no).ok_or(ProtocolError::UnknownRefNo(ref_no))?;
                let reply = call.reply_shape().decode(buf)?;
                Ok(Frame::Ok { ref_no, reply })
            }
            b'%' => {
                let ref_no = read_int(buf)?;
                if lookup(ref_no).is_none() {
                    return Err(ProtocolError::UnknownRefNo(ref_no));
                }
                let code = ErrorCode::from_code(read_int(buf)?);
                let detail = read_int(buf)?;
                Ok(Frame::Error {
                    ref_no,
                    code,
                    detail,
                })
            }
            b':' => {
                let _arg_count = read_int(buf)?;
                let msg_no = read_int(buf)?;
                Ok(Frame::Async(AsyncMessage::decode(msg_no, buf)?))
            }
            other => Err(ProtocolError::InvalidDiscriminator(other as char)),
        }
    }

    /// Returns the ref_no for replies, `None` for async messages.
    pub fn ref_no(&self) -> Option<u32> {
        match self {
            Frame::Ok { ref_no, .. } | Frame::Error { ref_no, .. } => Some(*ref_no),
            Frame::Async(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outstanding(ref_no: u32) -> Option<Call> {
        match ref_no {
            1 => Some(Call::Login),
            2 => Some(Call::GetTime),
            3 => Some(Call::GetUnreadConfs),
            _ => None,
        }
    }

    fn parse(data: &[u8]) -> Result<Frame, ProtocolError> {
        let mut buf = StreamBuffer::from_slice(data);
        Frame::parse(&mut buf, outstanding)
    }

    #[test]
    fn test_parse_ok_empty() {
        assert_eq!(
            parse(b"=1\n").unwrap(),
            Frame::Ok {
                ref_no: 1,
                reply: Reply::Empty
            }
        );
    }

    #[test]
    fn test_parse_ok_with_body() {
        let frame = parse(b"=3 2 { 6 42 }\n").unwrap();
        assert_eq!(frame.ref_no(), Some(3));
        assert_eq!(
            frame,
            Frame::Ok {
                ref_no: 3,
                reply: Reply::Numbers(vec![6, 42])
            }
        );
    }

    #[test]
    fn test_parse_error() {
        assert_eq!(
            parse(b"%1 4 0\n").unwrap(),
            Frame::Error {
                ref_no: 1,
                code: ErrorCode::InvalidPassword,
                detail: 0
            }
        );
    }

    #[test]
    fn test_parse_async() {
        let frame = parse(b":2 9 6 1234\n").unwrap();
        assert_eq!(frame.ref_no(), None);
        assert_eq!(
            frame,
            Frame::Async(AsyncMessage::Login {
                person: 6,
                session: 1234
            })
        );
    }

    #[test]
    fn test_parse_skips_leading_whitespace() {
        assert!(parse(b"\n\n =1\n").is_ok());
    }

    #[test]
    fn test_unknown_ref_no() {
        assert!(matches!(
            parse(b"=77\n"),
            Err(ProtocolError::UnknownRefNo(77))
        ));
        assert!(matches!(
            parse(b"%77 14 5\n"),
            Err(ProtocolError::UnknownRefNo(77))
        ));
    }

    #[test]
    fn test_invalid_discriminator() {
        assert!(matches!(
            parse(b"?1\n"),
            Err(ProtocolError::InvalidDiscriminator('?'))
        ));
    }

    #[test]
    fn test_incomplete() {
        assert!(parse(b"=2 5 30 14").unwrap_err().is_incomplete());
        assert!(parse(b"").unwrap_err().is_incomplete());
    }
}
