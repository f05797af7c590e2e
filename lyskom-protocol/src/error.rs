//! Protocol error types and server error codes.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding the Protocol A byte stream.
///
/// Everything except [`ProtocolError::Incomplete`] is a framing error: the
/// stream can no longer be trusted and the connection must be torn down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not enough buffered bytes to finish the current item. The decoder
    /// rewinds to its mark and waits for more data; callers never see this.
    #[error("incomplete data")]
    Incomplete,

    #[error("invalid frame discriminator {0:?}")]
    InvalidDiscriminator(char),

    #[error("expected digit, got {0:?}")]
    ExpectedDigit(char),

    #[error("integer does not fit in 32 bits")]
    IntegerOverflow,

    #[error("invalid hollerith terminator {0:?} (expected 'H')")]
    BadHollerithTerminator(char),

    #[error("invalid bit {0:?} in bitstring")]
    InvalidBit(char),

    #[error("invalid boolean value {0}")]
    InvalidBool(u32),

    #[error("invalid float literal {0:?}")]
    InvalidFloat(String),

    #[error("expected {expected}, got {found:?}")]
    UnexpectedByte { expected: &'static str, found: char },

    #[error("reply for unknown request ref_no {0}")]
    UnknownRefNo(u32),

    #[error("unknown async message number {0}")]
    UnknownAsyncMessage(u32),

    #[error("unknown misc-info tag {0}")]
    UnknownMiscInfo(u32),

    #[error("unknown text mapping block type {0}")]
    UnknownBlockType(u32),

    #[error("invalid handshake reply {0:?}")]
    BadHandshake(String),
}

impl ProtocolError {
    /// Returns whether this is the retryable "need more bytes" signal.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::Incomplete)
    }
}

macro_rules! error_codes {
    ($($code:literal => $variant:ident, $name:literal;)+) => {
        /// Error codes returned by the server in `%` replies.
        ///
        /// The numbers are fixed by Protocol A. Codes this client does not know
        /// about are preserved in [`ErrorCode::Unknown`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum ErrorCode {
            $($variant,)+
            Unknown(u32),
        }

        impl ErrorCode {
            /// Maps a wire error code to its variant.
            pub fn from_code(code: u32) -> Self {
                match code {
                    $($code => ErrorCode::$variant,)+
                    other => ErrorCode::Unknown(other),
                }
            }

            /// Returns the wire error code.
            pub fn code(&self) -> u32 {
                match self {
                    $(ErrorCode::$variant => $code,)+
                    ErrorCode::Unknown(code) => *code,
                }
            }

            /// Returns the protocol name of the error, e.g. `no-such-text`.
            pub fn name(&self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $name,)+
                    ErrorCode::Unknown(_) => "unknown-error",
                }
            }
        }
    };
}

error_codes! {
    0 => NoError, "no-error";
    2 => NotImplemented, "not-implemented";
    3 => ObsoleteCall, "obsolete-call";
    4 => InvalidPassword, "invalid-password";
    5 => StringTooLong, "string-too-long";
    6 => LoginFirst, "login-first";
    7 => LoginDisallowed, "login-disallowed";
    8 => ConferenceZero, "conference-zero";
    9 => UndefinedConference, "undefined-conference";
    10 => UndefinedPerson, "undefined-person";
    11 => AccessDenied, "access-denied";
    12 => PermissionDenied, "permission-denied";
    13 => NotMember, "not-member";
    14 => NoSuchText, "no-such-text";
    15 => TextZero, "text-zero";
    16 => NoSuchLocalText, "no-such-local-text";
    17 => LocalTextZero, "local-text-zero";
    18 => BadName, "bad-name";
    19 => IndexOutOfRange, "index-out-of-range";
    20 => ConferenceExists, "conference-exists";
    21 => PersonExists, "person-exists";
    22 => SecretPublic, "secret-public";
    23 => Letterbox, "letterbox";
    24 => LdbError, "ldb-error";
    25 => IllegalMisc, "illegal-misc";
    26 => IllegalInfoType, "illegal-info-type";
    27 => AlreadyRecipient, "already-recipient";
    28 => AlreadyComment, "already-comment";
    29 => AlreadyFootnote, "already-footnote";
    30 => NotRecipient, "not-recipient";
    31 => NotComment, "not-comment";
    32 => NotFootnote, "not-footnote";
    33 => RecipientLimit, "recipient-limit";
    34 => CommentLimit, "comment-limit";
    35 => FootnoteLimit, "footnote-limit";
    36 => MarkLimit, "mark-limit";
    37 => NotAuthor, "not-author";
    38 => NoConnect, "no-connect";
    39 => OutOfMemory, "out-of-memory";
    40 => ServerIsCrazy, "server-is-crazy";
    41 => ClientIsCrazy, "client-is-crazy";
    42 => UndefinedSession, "undefined-session";
    43 => RegexpError, "regexp-error";
    44 => NotMarked, "not-marked";
    45 => TemporaryFailure, "temporary-failure";
    46 => LongArray, "long-array";
    47 => AnonymousRejected, "anonymous-rejected";
    48 => IllegalAuxItem, "illegal-aux-item";
    49 => AuxItemPermission, "aux-item-permission";
    50 => UnknownAsync, "unknown-async";
    51 => InternalError, "internal-error";
    52 => FeatureDisabled, "feature-disabled";
    53 => MessageNotSent, "message-not-sent";
    54 => InvalidMembershipType, "invalid-membership-type";
    55 => InvalidRange, "invalid-range";
    56 => InvalidRangeList, "invalid-range-list";
    57 => UndefinedMeasurement, "undefined-measurement";
    58 => PriorityDenied, "priority-denied";
    59 => WeightDenied, "weight-denied";
    60 => WeightZero, "weight-zero";
    61 => BadBool, "bad-bool";
}

impl ErrorCode {
    /// Returns whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::TemporaryFailure | ErrorCode::OutOfMemory)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unknown(code) => write!(f, "unknown-error({})", code),
            other => write!(f, "{}", other.name()),
        }
    }
}
