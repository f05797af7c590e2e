//! Call numbers and the reply shape each call produces.
//!
//! Protocol A replies are not self-describing: the body of `=<ref_no> ...`
//! can only be parsed by knowing which call the ref_no belongs to. The table
//! below maps every supported call to its [`ReplyShape`].

use crate::buffer::StreamBuffer;
use crate::error::ProtocolError;
use crate::types::{
    ConfZInfo, Conference, DynamicSessionInfo, Mark, Member, Membership, Person,
    StaticSessionInfo, TextMapping, TextStat, UConference, VersionInfo,
};
use crate::wire::{read_array, read_int, Hollerith, Time, WireDecode};
use serde::Serialize;

macro_rules! calls {
    ($($no:literal => $variant:ident, $name:literal, $shape:ident;)+) => {
        /// A Protocol A call.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum Call {
            $($variant,)+
        }

        impl Call {
            /// Every supported call, in call-number order.
            pub const ALL: &'static [Call] = &[$(Call::$variant,)+];

            pub fn number(&self) -> u32 {
                match self {
                    $(Call::$variant => $no,)+
                }
            }

            /// Protocol name, e.g. `get-conf-stat`.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Call::$variant => $name,)+
                }
            }

            pub fn reply_shape(&self) -> ReplyShape {
                match self {
                    $(Call::$variant => ReplyShape::$shape,)+
                }
            }

            pub fn from_number(no: u32) -> Option<Call> {
                match no {
                    $($no => Some(Call::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

calls! {
    1 => Logout, "logout", Empty;
    2 => ChangeConference, "change-conference", Empty;
    3 => ChangeName, "change-name", Empty;
    4 => ChangeWhatIAmDoing, "change-what-i-am-doing", Empty;
    15 => SubMember, "sub-member", Empty;
    16 => SetPresentation, "set-presentation", Empty;
    23 => GetMarks, "get-marks", Marks;
    25 => GetText, "get-text", Text;
    27 => MarkAsRead, "mark-as-read", Empty;
    29 => DeleteText, "delete-text", Empty;
    30 => AddRecipient, "add-recipient", Empty;
    31 => SubRecipient, "sub-recipient", Empty;
    32 => AddComment, "add-comment", Empty;
    35 => GetTime, "get-time", Time;
    49 => GetPersonStat, "get-person-stat", Person;
    52 => GetUnreadConfs, "get-unread-confs", Numbers;
    53 => SendMessage, "send-message", Empty;
    55 => Disconnect, "disconnect", Empty;
    56 => WhoAmI, "who-am-i", Number;
    57 => SetUserArea, "set-user-area", Empty;
    60 => FindNextTextNo, "find-next-text-no", Number;
    61 => FindPreviousTextNo, "find-previous-text-no", Number;
    62 => Login, "login", Empty;
    69 => SetClientVersion, "set-client-version", Empty;
    72 => MarkText, "mark-text", Empty;
    73 => UnmarkText, "unmark-text", Empty;
    75 => GetVersionInfo, "get-version-info", VersionInfo;
    76 => LookupZName, "lookup-z-name", ConfZInfos;
    77 => SetLastRead, "set-last-read", Empty;
    78 => GetUconfStat, "get-uconf-stat", UConference;
    80 => AcceptAsync, "accept-async", Empty;
    81 => QueryAsync, "query-async", Numbers;
    82 => UserActive, "user-active", Empty;
    83 => WhoIsOnDynamic, "who-is-on-dynamic", Sessions;
    84 => GetStaticSessionInfo, "get-static-session-info", StaticSessionInfo;
    86 => CreateText, "create-text", Number;
    88 => CreateConf, "create-conf", Number;
    90 => GetTextStat, "get-text-stat", TextStat;
    91 => GetConfStat, "get-conf-stat", Conference;
    100 => AddMember, "add-member", Empty;
    101 => GetMembers, "get-members", Members;
    103 => LocalToGlobal, "local-to-global", TextMapping;
    104 => MapCreatedTexts, "map-created-texts", TextMapping;
    107 => QueryReadTexts, "query-read-texts", Membership;
    108 => GetMembership, "get-membership", Memberships;
    109 => MarkAsUnread, "mark-as-unread", Empty;
    110 => SetReadRanges, "set-read-ranges", Empty;
    114 => FirstUnusedConfNo, "first-unused-conf-no", Number;
    115 => FirstUnusedTextNo, "first-unused-text-no", Number;
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.number())
    }
}

/// How the body of an ok reply is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    Empty,
    Number,
    Text,
    Time,
    Person,
    Conference,
    UConference,
    TextStat,
    Membership,
    Memberships,
    TextMapping,
    Numbers,
    ConfZInfos,
    Sessions,
    StaticSessionInfo,
    Members,
    Marks,
    VersionInfo,
}

impl ReplyShape {
    /// Parses a reply body of this shape.
    pub fn decode(self, buf: &mut StreamBuffer) -> Result<Reply, ProtocolError> {
        Ok(match self {
            ReplyShape::Empty => Reply::Empty,
            ReplyShape::Number => Reply::Number(read_int(buf)?),
            ReplyShape::Text => Reply::Text(Hollerith::decode(buf)?),
            ReplyShape::Time => Reply::Time(Time::decode(buf)?),
            ReplyShape::Person => Reply::Person(Person::decode(buf)?),
            ReplyShape::Conference => Reply::Conference(Conference::decode(buf)?),
            ReplyShape::UConference => Reply::UConference(UConference::decode(buf)?),
            ReplyShape::TextStat => Reply::TextStat(TextStat::decode(buf)?),
            ReplyShape::Membership => Reply::Membership(Membership::decode(buf)?),
            ReplyShape::Memberships => Reply::Memberships(read_array(buf, Membership::decode)?),
            ReplyShape::TextMapping => Reply::TextMapping(TextMapping::decode(buf)?),
            ReplyShape::Numbers => Reply::Numbers(read_array(buf, read_int)?),
            ReplyShape::ConfZInfos => Reply::ConfZInfos(read_array(buf, ConfZInfo::decode)?),
            ReplyShape::Sessions => {
                Reply::Sessions(read_array(buf, DynamicSessionInfo::decode)?)
            }
            ReplyShape::StaticSessionInfo => {
                Reply::StaticSessionInfo(StaticSessionInfo::decode(buf)?)
            }
            ReplyShape::Members => Reply::Members(read_array(buf, Member::decode)?),
            ReplyShape::Marks => Reply::Marks(read_array(buf, Mark::decode)?),
            ReplyShape::VersionInfo => Reply::VersionInfo(VersionInfo::decode(buf)?),
        })
    }
}

/// A decoded ok-reply body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Empty,
    Number(u32),
    Text(Hollerith),
    Time(Time),
    Person(Person),
    Conference(Conference),
    UConference(UConference),
    TextStat(TextStat),
    Membership(Membership),
    Memberships(Vec<Membership>),
    TextMapping(TextMapping),
    Numbers(Vec<u32>),
    ConfZInfos(Vec<ConfZInfo>),
    Sessions(Vec<DynamicSessionInfo>),
    StaticSessionInfo(StaticSessionInfo),
    Members(Vec<Member>),
    Marks(Vec<Mark>),
    VersionInfo(VersionInfo),
}

/// Typed extraction of reply bodies. A mismatched variant is handed back
/// unchanged as the error.
macro_rules! reply_conversions {
    ($($variant:ident => $ty:ty;)+) => {
        $(
            impl TryFrom<Reply> for $ty {
                type Error = Reply;

                fn try_from(reply: Reply) -> Result<Self, Reply> {
                    match reply {
                        Reply::$variant(value) => Ok(value),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

reply_conversions! {
    Number => u32;
    Text => Hollerith;
    Time => Time;
    Person => Person;
    Conference => Conference;
    UConference => UConference;
    TextStat => TextStat;
    Membership => Membership;
    Memberships => Vec<Membership>;
    TextMapping => TextMapping;
    Numbers => Vec<u32>;
    ConfZInfos => Vec<ConfZInfo>;
    Sessions => Vec<DynamicSessionInfo>;
    StaticSessionInfo => StaticSessionInfo;
    Members => Vec<Member>;
    Marks => Vec<Mark>;
    VersionInfo => VersionInfo;
}

impl TryFrom<Reply> for () {
    type Error = Reply;

    fn try_from(reply: Reply) -> Result<Self, Reply> {
        match reply {
            Reply::Empty => Ok(()),
            other => Err(other),
        }
    }
}
