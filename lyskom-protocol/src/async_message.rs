//! Server-initiated (asynchronous) messages.
//!
//! On the wire: `:<arg_count> <msg_no> <body>`. The argument count carries
//! no information the body layout does not already fix, so it is read and
//! dropped by the frame parser.

use crate::buffer::StreamBuffer;
use crate::error::ProtocolError;
use crate::types::{
    AuxItem, ConfNo, PersNo, SessionNo, TextNo, TextStat, TextStatOld, WhoInfo,
};
use crate::wire::{read_array, read_int, Hollerith, WireDecode};
use serde::Serialize;

macro_rules! async_kinds {
    ($($no:literal => $variant:ident, $name:literal;)+) => {
        /// The kind of an async message, used for subscriptions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum AsyncKind {
            $($variant,)+
        }

        impl AsyncKind {
            pub const ALL: &'static [AsyncKind] = &[$(AsyncKind::$variant,)+];

            pub fn number(&self) -> u32 {
                match self {
                    $(AsyncKind::$variant => $no,)+
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(AsyncKind::$variant => $name,)+
                }
            }

            pub fn from_number(no: u32) -> Option<AsyncKind> {
                match no {
                    $($no => Some(AsyncKind::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

async_kinds! {
    0 => NewTextOld, "new-text-old";
    1 => IAmOff, "i-am-off";
    2 => IAmOnObsolete, "i-am-on-obsolete";
    5 => NewName, "new-name";
    6 => IAmOn, "i-am-on";
    7 => SyncDb, "sync-db";
    8 => LeaveConf, "leave-conf";
    9 => Login, "login";
    10 => Broadcast, "broadcast";
    11 => RejectedConnection, "rejected-connection";
    12 => SendMessage, "send-message";
    13 => Logout, "logout";
    14 => DeletedText, "deleted-text";
    15 => NewText, "new-text";
    16 => NewRecipient, "new-recipient";
    17 => SubRecipient, "sub-recipient";
    18 => NewMembership, "new-membership";
    19 => NewUserArea, "new-user-area";
    20 => NewPresentation, "new-presentation";
    21 => NewMotd, "new-motd";
    22 => TextAuxChanged, "text-aux-changed";
}

impl std::fmt::Display for AsyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded async message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AsyncMessage {
    NewTextOld {
        text_no: TextNo,
        text_stat: TextStatOld,
    },
    IAmOff {
        person: PersNo,
    },
    IAmOnObsolete {
        person: PersNo,
        conference: ConfNo,
        what_am_i_doing: Hollerith,
    },
    NewName {
        conf_no: ConfNo,
        old_name: Hollerith,
        new_name: Hollerith,
    },
    IAmOn(WhoInfo),
    SyncDb,
    LeaveConf {
        conf_no: ConfNo,
    },
    Login {
        person: PersNo,
        session: SessionNo,
    },
    Broadcast {
        sender: PersNo,
        message: Hollerith,
    },
    RejectedConnection,
    SendMessage {
        recipient: ConfNo,
        sender: PersNo,
        message: Hollerith,
    },
    Logout {
        person: PersNo,
        session: SessionNo,
    },
    DeletedText {
        text_no: TextNo,
        text_stat: TextStat,
    },
    NewText {
        text_no: TextNo,
        text_stat: TextStat,
    },
    NewRecipient {
        text_no: TextNo,
        conf_no: ConfNo,
        recipient_type: u32,
    },
    SubRecipient {
        text_no: TextNo,
        conf_no: ConfNo,
        recipient_type: u32,
    },
    NewMembership {
        person: PersNo,
        conf_no: ConfNo,
    },
    NewUserArea {
        person: PersNo,
        old_user_area: TextNo,
        new_user_area: TextNo,
    },
    NewPresentation {
        conf_no: ConfNo,
        old_presentation: TextNo,
        new_presentation: TextNo,
    },
    NewMotd {
        conf_no: ConfNo,
        old_motd: TextNo,
        new_motd: TextNo,
    },
    TextAuxChanged {
        text_no: TextNo,
        deleted: Vec<AuxItem>,
        added: Vec<AuxItem>,
    },
}

impl AsyncMessage {
    /// Decodes the body of message `msg_no`.
    ///
    /// Bodies are not self-describing, so an unknown number cannot be
    /// skipped and is a framing error.
    pub fn decode(msg_no: u32, buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        let kind =
            AsyncKind::from_number(msg_no).ok_or(ProtocolError::UnknownAsyncMessage(msg_no))?;
        Ok(match kind {
            AsyncKind::NewTextOld => AsyncMessage::NewTextOld {
                text_no: read_int(buf)?,
                text_stat: TextStatOld::decode(buf)?,
            },
            AsyncKind::IAmOff => AsyncMessage::IAmOff {
                person: read_int(buf)?,
            },
            AsyncKind::IAmOnObsolete => AsyncMessage::IAmOnObsolete {
                person: read_int(buf)?,
                conference: read_int(buf)?,
                what_am_i_doing: Hollerith::decode(buf)?,
            },
            AsyncKind::NewName => AsyncMessage::NewName {
                conf_no: read_int(buf)?,
                old_name: Hollerith::decode(buf)?,
                new_name: Hollerith::decode(buf)?,
            },
            AsyncKind::IAmOn => AsyncMessage::IAmOn(WhoInfo::decode(buf)?),
            AsyncKind::SyncDb => AsyncMessage::SyncDb,
            AsyncKind::LeaveConf => AsyncMessage::LeaveConf {
                conf_no: read_int(buf)?,
            },
            AsyncKind::Login => AsyncMessage::Login {
                person: read_int(buf)?,
                session: read_int(buf)?,
            },
            AsyncKind::Broadcast => AsyncMessage::Broadcast {
                sender: read_int(buf)?,
                message: Hollerith::decode(buf)?,
            },
            AsyncKind::RejectedConnection => AsyncMessage::RejectedConnection,
            AsyncKind::SendMessage => AsyncMessage::SendMessage {
                recipient: read_int(buf)?,
                sender: read_int(buf)?,
                message: Hollerith::decode(buf)?,
            },
            AsyncKind::Logout => AsyncMessage::Logout {
                person: read_int(buf)?,
                session: read_int(buf)?,
            },
            AsyncKind::DeletedText => AsyncMessage::DeletedText {
                text_no: read_int(buf)?,
                text_stat: TextStat::decode(buf)?,
            },
            AsyncKind::NewText => AsyncMessage::NewText {
                text_no: read_int(buf)?,
                text_stat: TextStat::decode(buf)?,
            },
            AsyncKind::NewRecipient => AsyncMessage::NewRecipient {
                text_no: read_int(buf)?,
                conf_no: read_int(buf)?,
                recipient_type: read_int(buf)?,
            },
            AsyncKind::SubRecipient => AsyncMessage::SubRecipient {
                text_no: read_int(buf)?,
                conf_no: read_int(buf)?,
                recipient_type: read_int(buf)?,
            },
            AsyncKind::NewMembership => AsyncMessage::NewMembership {
                person: read_int(buf)?,
                conf_no: read_int(buf)?,
            },
            AsyncKind::NewUserArea => AsyncMessage::NewUserArea {
                person: read_int(buf)?,
                old_user_area: read_int(buf)?,
                new_user_area: read_int(buf)?,
            },
            AsyncKind::NewPresentation => AsyncMessage::NewPresentation {
                conf_no: read_int(buf)?,
                old_presentation: read_int(buf)?,
                new_presentation: read_int(buf)?,
            },
            AsyncKind::NewMotd => AsyncMessage::NewMotd {
                conf_no: read_int(buf)?,
                old_motd: read_int(buf)?,
                new_motd: read_int(buf)?,
            },
            AsyncKind::TextAuxChanged => AsyncMessage::TextAuxChanged {
                text_no: read_int(buf)?,
                deleted: read_array(buf, AuxItem::decode)?,
                added: read_array(buf, AuxItem::decode)?,
            },
        })
    }

    pub fn kind(&self) -> AsyncKind {
        match self {
            AsyncMessage::NewTextOld { .. } => AsyncKind::NewTextOld,
            AsyncMessage::IAmOff { .. } => AsyncKind::IAmOff,
            AsyncMessage::IAmOnObsolete { .. } => AsyncKind::IAmOnObsolete,
            AsyncMessage::NewName { .. } => AsyncKind::NewName,
            AsyncMessage::IAmOn(_) => AsyncKind::IAmOn,
            AsyncMessage::SyncDb => AsyncKind::SyncDb,
            AsyncMessage::LeaveConf { .. } => AsyncKind::LeaveConf,
            AsyncMessage::Login { .. } => AsyncKind::Login,
            AsyncMessage::Broadcast { .. } => AsyncKind::Broadcast,
            AsyncMessage::RejectedConnection => AsyncKind::RejectedConnection,
            AsyncMessage::SendMessage { .. } => AsyncKind::SendMessage,
            AsyncMessage::Logout { .. } => AsyncKind::Logout,
            AsyncMessage::DeletedText { .. } => AsyncKind::DeletedText,
            AsyncMessage::NewText { .. } => AsyncKind::NewText,
            AsyncMessage::NewRecipient { .. } => AsyncKind::NewRecipient,
            AsyncMessage::SubRecipient { .. } => AsyncKind::SubRecipient,
            AsyncMessage::NewMembership { .. } => AsyncKind::NewMembership,
            AsyncMessage::NewUserArea { .. } => AsyncKind::NewUserArea,
            AsyncMessage::NewPresentation { .. } => AsyncKind::NewPresentation,
            AsyncMessage::NewMotd { .. } => AsyncKind::NewMotd,
            AsyncMessage::TextAuxChanged { .. } => AsyncKind::TextAuxChanged,
        }
    }
}
