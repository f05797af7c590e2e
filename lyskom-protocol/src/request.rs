//! Outgoing requests.
//!
//! A request is one line: `<ref_no> <call_no> <args...>\n`. The ref_no is
//! assigned by the connection at send time, so [`Request`] only carries the
//! call and its arguments.

use crate::call::Call;
use crate::types::{
    AuxItemInput, ConfNo, ExtendedConfType, LocalTextNo, MembershipType, MiscInfo, PersNo,
    ReadRange, SessionNo, TextNo,
};
use crate::wire::{put_array, put_bits, put_int, Hollerith, Time, WireEncode};
use bytes::{BufMut, BytesMut};

/// One typed request argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(u32),
    Bool(bool),
    String(Hollerith),
    Bits(Vec<bool>),
    Time(Time),
    /// `<count> { a b c }`.
    Array(Vec<Arg>),
    /// Several values written one after another without array framing,
    /// used for compound elements such as misc-info items.
    Seq(Vec<Arg>),
}

impl Arg {
    pub fn string(value: impl Into<Hollerith>) -> Self {
        Arg::String(value.into())
    }

    pub fn array<T>(items: impl IntoIterator<Item = T>) -> Self
    where
        T: Into<Arg>,
    {
        Arg::Array(items.into_iter().map(Into::into).collect())
    }
}

impl WireEncode for Arg {
    fn encode(&self, out: &mut BytesMut) {
        match self {
            Arg::Int(value) => put_int(out, *value),
            Arg::Bool(value) => value.encode(out),
            Arg::String(value) => value.encode(out),
            Arg::Bits(bits) => put_bits(out, bits),
            Arg::Time(time) => time.encode(out),
            Arg::Array(items) => put_array(out, items),
            Arg::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.put_u8(b' ');
                    }
                    item.encode(out);
                }
            }
        }
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<Hollerith> for Arg {
    fn from(value: Hollerith) -> Self {
        Arg::String(value)
    }
}

impl From<ReadRange> for Arg {
    fn from(range: ReadRange) -> Self {
        Arg::Seq(vec![Arg::Int(range.first_read), Arg::Int(range.last_read)])
    }
}

impl From<MiscInfo> for Arg {
    fn from(item: MiscInfo) -> Self {
        let value = match item {
            MiscInfo::RecTime(time) | MiscInfo::SentAt(time) => Arg::Time(time),
            MiscInfo::Recpt(n)
            | MiscInfo::CcRecpt(n)
            | MiscInfo::BccRecpt(n)
            | MiscInfo::CommTo(n)
            | MiscInfo::CommIn(n)
            | MiscInfo::FootnTo(n)
            | MiscInfo::FootnIn(n)
            | MiscInfo::LocNo(n)
            | MiscInfo::SentBy(n) => Arg::Int(n),
        };
        Arg::Seq(vec![Arg::Int(item.tag()), value])
    }
}

impl From<AuxItemInput> for Arg {
    fn from(item: AuxItemInput) -> Self {
        Arg::Seq(vec![
            Arg::Int(item.tag),
            Arg::Bits(item.flags.to_bits().to_vec()),
            Arg::Int(item.inherit_limit),
            Arg::String(item.data),
        ])
    }
}

/// A call together with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub call: Call,
    pub args: Vec<Arg>,
}

impl Request {
    pub fn new(call: Call, args: Vec<Arg>) -> Self {
        Self { call, args }
    }

    /// Writes `<ref_no> <call_no> <args...>\n`.
    pub fn encode(&self, ref_no: u32, out: &mut BytesMut) {
        put_int(out, ref_no);
        out.put_u8(b' ');
        put_int(out, self.call.number());
        for arg in &self.args {
            out.put_u8(b' ');
            arg.encode(out);
        }
        out.put_u8(b'\n');
    }

    // --- Sessions -------------------------------------------------------

    pub fn login(person: PersNo, password: impl Into<Hollerith>, invisible: bool) -> Self {
        Self::new(
            Call::Login,
            vec![person.into(), Arg::string(password), invisible.into()],
        )
    }

    pub fn logout() -> Self {
        Self::new(Call::Logout, vec![])
    }

    pub fn disconnect(session: SessionNo) -> Self {
        Self::new(Call::Disconnect, vec![session.into()])
    }

    pub fn who_am_i() -> Self {
        Self::new(Call::WhoAmI, vec![])
    }

    pub fn change_conference(conf: ConfNo) -> Self {
        Self::new(Call::ChangeConference, vec![conf.into()])
    }

    pub fn change_what_i_am_doing(what: impl Into<Hollerith>) -> Self {
        Self::new(Call::ChangeWhatIAmDoing, vec![Arg::string(what)])
    }

    pub fn set_client_version(name: impl Into<Hollerith>, version: impl Into<Hollerith>) -> Self {
        Self::new(
            Call::SetClientVersion,
            vec![Arg::string(name), Arg::string(version)],
        )
    }

    pub fn user_active() -> Self {
        Self::new(Call::UserActive, vec![])
    }

    pub fn who_is_on_dynamic(want_visible: bool, want_invisible: bool, active_last: u32) -> Self {
        Self::new(
            Call::WhoIsOnDynamic,
            vec![want_visible.into(), want_invisible.into(), active_last.into()],
        )
    }

    pub fn get_static_session_info(session: SessionNo) -> Self {
        Self::new(Call::GetStaticSessionInfo, vec![session.into()])
    }

    pub fn accept_async(kinds: &[u32]) -> Self {
        Self::new(Call::AcceptAsync, vec![Arg::array(kinds.iter().copied())])
    }

    pub fn query_async() -> Self {
        Self::new(Call::QueryAsync, vec![])
    }

    pub fn send_message(recipient: ConfNo, message: impl Into<Hollerith>) -> Self {
        Self::new(Call::SendMessage, vec![recipient.into(), Arg::string(message)])
    }

    // --- Server ---------------------------------------------------------

    pub fn get_time() -> Self {
        Self::new(Call::GetTime, vec![])
    }

    pub fn get_version_info() -> Self {
        Self::new(Call::GetVersionInfo, vec![])
    }

    pub fn first_unused_conf_no() -> Self {
        Self::new(Call::FirstUnusedConfNo, vec![])
    }

    pub fn first_unused_text_no() -> Self {
        Self::new(Call::FirstUnusedTextNo, vec![])
    }

    pub fn lookup_z_name(name: impl Into<Hollerith>, want_persons: bool, want_confs: bool) -> Self {
        Self::new(
            Call::LookupZName,
            vec![Arg::string(name), want_persons.into(), want_confs.into()],
        )
    }

    // --- Persons and conferences ----------------------------------------

    pub fn get_person_stat(person: PersNo) -> Self {
        Self::new(Call::GetPersonStat, vec![person.into()])
    }

    pub fn set_user_area(person: PersNo, text: TextNo) -> Self {
        Self::new(Call::SetUserArea, vec![person.into(), text.into()])
    }

    pub fn get_conf_stat(conf: ConfNo) -> Self {
        Self::new(Call::GetConfStat, vec![conf.into()])
    }

    pub fn get_uconf_stat(conf: ConfNo) -> Self {
        Self::new(Call::GetUconfStat, vec![conf.into()])
    }

    pub fn change_name(conf: ConfNo, new_name: impl Into<Hollerith>) -> Self {
        Self::new(Call::ChangeName, vec![conf.into(), Arg::string(new_name)])
    }

    pub fn set_presentation(conf: ConfNo, text: TextNo) -> Self {
        Self::new(Call::SetPresentation, vec![conf.into(), text.into()])
    }

    pub fn create_conf(
        name: impl Into<Hollerith>,
        conf_type: ExtendedConfType,
        aux_items: Vec<AuxItemInput>,
    ) -> Self {
        Self::new(
            Call::CreateConf,
            vec![
                Arg::string(name),
                Arg::Bits(conf_type.to_bits().to_vec()),
                Arg::array(aux_items),
            ],
        )
    }

    pub fn get_unread_confs(person: PersNo) -> Self {
        Self::new(Call::GetUnreadConfs, vec![person.into()])
    }

    // --- Memberships ----------------------------------------------------

    pub fn add_member(
        conf: ConfNo,
        person: PersNo,
        priority: u32,
        position: u32,
        membership_type: MembershipType,
    ) -> Self {
        Self::new(
            Call::AddMember,
            vec![
                conf.into(),
                person.into(),
                priority.into(),
                position.into(),
                Arg::Bits(membership_type.to_bits().to_vec()),
            ],
        )
    }

    pub fn sub_member(conf: ConfNo, person: PersNo) -> Self {
        Self::new(Call::SubMember, vec![conf.into(), person.into()])
    }

    pub fn get_members(conf: ConfNo, first: u32, count: u32) -> Self {
        Self::new(Call::GetMembers, vec![conf.into(), first.into(), count.into()])
    }

    pub fn query_read_texts(
        person: PersNo,
        conf: ConfNo,
        want_read_ranges: bool,
        max_ranges: u32,
    ) -> Self {
        Self::new(
            Call::QueryReadTexts,
            vec![
                person.into(),
                conf.into(),
                want_read_ranges.into(),
                max_ranges.into(),
            ],
        )
    }

    pub fn get_membership(
        person: PersNo,
        first: u32,
        count: u32,
        want_read_ranges: bool,
        max_ranges: u32,
    ) -> Self {
        Self::new(
            Call::GetMembership,
            vec![
                person.into(),
                first.into(),
                count.into(),
                want_read_ranges.into(),
                max_ranges.into(),
            ],
        )
    }

    pub fn mark_as_read(conf: ConfNo, local_texts: &[LocalTextNo]) -> Self {
        Self::new(
            Call::MarkAsRead,
            vec![conf.into(), Arg::array(local_texts.iter().copied())],
        )
    }

    pub fn mark_as_unread(conf: ConfNo, local_text: LocalTextNo) -> Self {
        Self::new(Call::MarkAsUnread, vec![conf.into(), local_text.into()])
    }

    pub fn set_read_ranges(conf: ConfNo, ranges: &[ReadRange]) -> Self {
        Self::new(
            Call::SetReadRanges,
            vec![conf.into(), Arg::array(ranges.iter().copied())],
        )
    }

    pub fn set_last_read(conf: ConfNo, last_read: LocalTextNo) -> Self {
        Self::new(Call::SetLastRead, vec![conf.into(), last_read.into()])
    }

    // --- Texts ----------------------------------------------------------

    pub fn get_text(text: TextNo, start_char: u32, end_char: u32) -> Self {
        Self::new(
            Call::GetText,
            vec![text.into(), start_char.into(), end_char.into()],
        )
    }

    pub fn get_text_stat(text: TextNo) -> Self {
        Self::new(Call::GetTextStat, vec![text.into()])
    }

    pub fn create_text(
        body: impl Into<Hollerith>,
        misc_info: Vec<MiscInfo>,
        aux_items: Vec<AuxItemInput>,
    ) -> Self {
        Self::new(
            Call::CreateText,
            vec![
                Arg::string(body),
                Arg::array(misc_info),
                Arg::array(aux_items),
            ],
        )
    }

    pub fn delete_text(text: TextNo) -> Self {
        Self::new(Call::DeleteText, vec![text.into()])
    }

    /// `kind` is the misc-info tag of the recipient role (0, 1 or 15).
    pub fn add_recipient(text: TextNo, conf: ConfNo, kind: u32) -> Self {
        Self::new(
            Call::AddRecipient,
            vec![text.into(), conf.into(), kind.into()],
        )
    }

    pub fn sub_recipient(text: TextNo, conf: ConfNo) -> Self {
        Self::new(Call::SubRecipient, vec![text.into(), conf.into()])
    }

    pub fn add_comment(text: TextNo, comment_to: TextNo) -> Self {
        Self::new(Call::AddComment, vec![text.into(), comment_to.into()])
    }

    pub fn find_next_text_no(start: TextNo) -> Self {
        Self::new(Call::FindNextTextNo, vec![start.into()])
    }

    pub fn find_previous_text_no(start: TextNo) -> Self {
        Self::new(Call::FindPreviousTextNo, vec![start.into()])
    }

    pub fn local_to_global(conf: ConfNo, first_local: LocalTextNo, count: u32) -> Self {
        Self::new(
            Call::LocalToGlobal,
            vec![conf.into(), first_local.into(), count.into()],
        )
    }

    pub fn map_created_texts(author: PersNo, first_local: LocalTextNo, count: u32) -> Self {
        Self::new(
            Call::MapCreatedTexts,
            vec![author.into(), first_local.into(), count.into()],
        )
    }

    pub fn get_marks() -> Self {
        Self::new(Call::GetMarks, vec![])
    }

    pub fn mark_text(text: TextNo, mark_type: u32) -> Self {
        Self::new(Call::MarkText, vec![text.into(), mark_type.into()])
    }

    pub fn unmark_text(text: TextNo) -> Self {
        Self::new(Call::UnmarkText, vec![text.into()])
    }
}
