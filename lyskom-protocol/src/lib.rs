//! # lyskom-protocol
//!
//! Wire protocol implementation for LysKOM Protocol A.
//!
//! This crate provides:
//! - A mark/reset receive buffer for incremental parsing
//! - Primitive codecs (integers, Hollerith strings, bitstrings, arrays, time)
//! - The server datatypes (conferences, persons, text stats, memberships, ...)
//! - The call table with per-call reply shapes
//! - Async message decoding and error codes

pub mod async_message;
pub mod buffer;
pub mod call;
pub mod codec;
pub mod error;
pub mod frame;
pub mod request;
pub mod types;
pub mod wire;

pub use async_message::{AsyncKind, AsyncMessage};
pub use buffer::StreamBuffer;
pub use call::{Call, Reply, ReplyShape};
pub use codec::{Decoder, Encoder};
pub use error::{ErrorCode, ProtocolError};
pub use frame::Frame;
pub use request::{Arg, Request};
pub use types::*;
pub use wire::{Hollerith, Time, WireDecode, WireEncode};

/// Default port of a LysKOM server.
pub const DEFAULT_PORT: u16 = 4894;

/// The server's reply to a successful handshake.
pub const HANDSHAKE_REPLY: &[u8] = b"LysKOM\n";

/// Largest number of texts one `local-to-global` request may ask for.
pub const MAX_MAPPING_PAGE: u32 = 255;
