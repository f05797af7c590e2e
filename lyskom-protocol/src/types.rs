//! Compound Protocol A datatypes.
//!
//! Fields are declared in wire order; every `decode` reads them in
//! declaration order.

use crate::buffer::StreamBuffer;
use crate::error::ProtocolError;
use crate::wire::{bitstring, read_array, read_bool, read_int, Hollerith, Time, WireDecode};
use serde::Serialize;

pub type ConfNo = u32;
pub type PersNo = u32;
pub type TextNo = u32;
pub type LocalTextNo = u32;
pub type SessionNo = u32;

// =========================================================================
// Flag fields
// =========================================================================

bitstring! {
    /// Conference type in its 4-bit form.
    pub struct ConfType[4] {
        rd_prot,
        original,
        secret,
        letterbox,
    }
}

bitstring! {
    /// Conference type in its 8-bit form.
    pub struct ExtendedConfType[8] {
        rd_prot,
        original,
        secret,
        letterbox,
        allow_anonymous,
        forbid_secret,
        reserved2,
        reserved3,
    }
}

bitstring! {
    pub struct MembershipType[8] {
        invitation,
        passive,
        secret,
        passive_message_invert,
        reserved2,
        reserved3,
        reserved4,
        reserved5,
    }
}

bitstring! {
    pub struct AuxItemFlags[8] {
        deleted,
        inherit,
        secret,
        hide_creator,
        dont_garb,
        reserved2,
        reserved3,
        reserved4,
    }
}

bitstring! {
    /// Privilege bits of a person.
    pub struct PrivBits[16] {
        wheel,
        admin,
        statistic,
        create_pers,
        create_conf,
        change_name,
        flg7,
        flg8,
        flg9,
        flg10,
        flg11,
        flg12,
        flg13,
        flg14,
        flg15,
        flg16,
    }
}

bitstring! {
    pub struct PersonalFlags[8] {
        unread_is_secret,
        flg2,
        flg3,
        flg4,
        flg5,
        flg6,
        flg7,
        flg8,
    }
}

bitstring! {
    pub struct SessionFlags[8] {
        invisible,
        user_active_used,
        user_attribute,
        reserved3,
        reserved4,
        reserved5,
        reserved6,
        reserved7,
    }
}

// =========================================================================
// Memberships
// =========================================================================

/// Inclusive range of local text numbers marked as read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadRange {
    pub first_read: LocalTextNo,
    pub last_read: LocalTextNo,
}

impl ReadRange {
    pub fn new(first_read: LocalTextNo, last_read: LocalTextNo) -> Self {
        Self {
            first_read,
            last_read,
        }
    }

    /// An all-zero range stands for "nothing read".
    pub fn is_empty(&self) -> bool {
        self.first_read == 0 && self.last_read == 0
    }
}

impl WireDecode for ReadRange {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            first_read: read_int(buf)?,
            last_read: read_int(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    /// Index in the person's membership list.
    pub position: u32,
    pub last_time_read: Time,
    pub conference: ConfNo,
    pub priority: u32,
    pub read_ranges: Vec<ReadRange>,
    pub added_by: PersNo,
    pub added_at: Time,
    pub membership_type: MembershipType,
}

impl WireDecode for Membership {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            position: read_int(buf)?,
            last_time_read: Time::decode(buf)?,
            conference: read_int(buf)?,
            priority: read_int(buf)?,
            read_ranges: read_array(buf, ReadRange::decode)?,
            added_by: read_int(buf)?,
            added_at: Time::decode(buf)?,
            membership_type: MembershipType::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub member: PersNo,
    pub added_by: PersNo,
    pub added_at: Time,
    pub membership_type: MembershipType,
}

impl WireDecode for Member {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            member: read_int(buf)?,
            added_by: read_int(buf)?,
            added_at: Time::decode(buf)?,
            membership_type: MembershipType::decode(buf)?,
        })
    }
}

// =========================================================================
// Texts
// =========================================================================

/// One item of a text's misc-info list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum MiscInfo {
    Recpt(ConfNo),
    CcRecpt(ConfNo),
    BccRecpt(ConfNo),
    CommTo(TextNo),
    CommIn(TextNo),
    FootnTo(TextNo),
    FootnIn(TextNo),
    LocNo(LocalTextNo),
    RecTime(Time),
    SentBy(PersNo),
    SentAt(Time),
}

impl MiscInfo {
    /// Returns the wire tag of this item.
    pub fn tag(&self) -> u32 {
        match self {
            MiscInfo::Recpt(_) => 0,
            MiscInfo::CcRecpt(_) => 1,
            MiscInfo::CommTo(_) => 2,
            MiscInfo::CommIn(_) => 3,
            MiscInfo::FootnTo(_) => 4,
            MiscInfo::FootnIn(_) => 5,
            MiscInfo::LocNo(_) => 6,
            MiscInfo::RecTime(_) => 7,
            MiscInfo::SentBy(_) => 8,
            MiscInfo::SentAt(_) => 9,
            MiscInfo::BccRecpt(_) => 15,
        }
    }

    /// Conferences the text is sent to, in any recipient role.
    pub fn recipients(items: &[MiscInfo]) -> impl Iterator<Item = ConfNo> + '_ {
        items.iter().filter_map(|item| match item {
            MiscInfo::Recpt(c) | MiscInfo::CcRecpt(c) | MiscInfo::BccRecpt(c) => Some(*c),
            _ => None,
        })
    }

    /// Texts this text is a comment or footnote to.
    pub fn commented(items: &[MiscInfo]) -> impl Iterator<Item = TextNo> + '_ {
        items.iter().filter_map(|item| match item {
            MiscInfo::CommTo(t) | MiscInfo::FootnTo(t) => Some(*t),
            _ => None,
        })
    }

    /// Texts that comment on or footnote this text.
    pub fn comments(items: &[MiscInfo]) -> impl Iterator<Item = TextNo> + '_ {
        items.iter().filter_map(|item| match item {
            MiscInfo::CommIn(t) | MiscInfo::FootnIn(t) => Some(*t),
            _ => None,
        })
    }
}

impl WireDecode for MiscInfo {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        let tag = read_int(buf)?;
        Ok(match tag {
            0 => MiscInfo::Recpt(read_int(buf)?),
            1 => MiscInfo::CcRecpt(read_int(buf)?),
            2 => MiscInfo::CommTo(read_int(buf)?),
            3 => MiscInfo::CommIn(read_int(buf)?),
            4 => MiscInfo::FootnTo(read_int(buf)?),
            5 => MiscInfo::FootnIn(read_int(buf)?),
            6 => MiscInfo::LocNo(read_int(buf)?),
            7 => MiscInfo::RecTime(Time::decode(buf)?),
            8 => MiscInfo::SentBy(read_int(buf)?),
            9 => MiscInfo::SentAt(Time::decode(buf)?),
            15 => MiscInfo::BccRecpt(read_int(buf)?),
            other => return Err(ProtocolError::UnknownMiscInfo(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuxItem {
    pub aux_no: u32,
    pub tag: u32,
    pub creator: PersNo,
    pub created_at: Time,
    pub flags: AuxItemFlags,
    pub inherit_limit: u32,
    pub data: Hollerith,
}

impl WireDecode for AuxItem {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            aux_no: read_int(buf)?,
            tag: read_int(buf)?,
            creator: read_int(buf)?,
            created_at: Time::decode(buf)?,
            flags: AuxItemFlags::decode(buf)?,
            inherit_limit: read_int(buf)?,
            data: Hollerith::decode(buf)?,
        })
    }
}

/// Aux-item as sent in create calls (the server fills in number, creator
/// and time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxItemInput {
    pub tag: u32,
    pub flags: AuxItemFlags,
    pub inherit_limit: u32,
    pub data: Hollerith,
}

impl AuxItemInput {
    pub fn new(tag: u32, data: impl Into<Hollerith>) -> Self {
        Self {
            tag,
            flags: AuxItemFlags::default(),
            inherit_limit: 0,
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextStat {
    pub creation_time: Time,
    pub author: PersNo,
    pub no_of_lines: u32,
    pub no_of_chars: u32,
    pub no_of_marks: u32,
    pub misc_info: Vec<MiscInfo>,
    pub aux_items: Vec<AuxItem>,
}

impl TextStat {
    pub fn recipients(&self) -> impl Iterator<Item = ConfNo> + '_ {
        MiscInfo::recipients(&self.misc_info)
    }

    pub fn commented(&self) -> impl Iterator<Item = TextNo> + '_ {
        MiscInfo::commented(&self.misc_info)
    }

    pub fn comments(&self) -> impl Iterator<Item = TextNo> + '_ {
        MiscInfo::comments(&self.misc_info)
    }
}

impl WireDecode for TextStat {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            creation_time: Time::decode(buf)?,
            author: read_int(buf)?,
            no_of_lines: read_int(buf)?,
            no_of_chars: read_int(buf)?,
            no_of_marks: read_int(buf)?,
            misc_info: read_array(buf, MiscInfo::decode)?,
            aux_items: read_array(buf, AuxItem::decode)?,
        })
    }
}

/// Text status without aux-items, as carried by the legacy new-text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextStatOld {
    pub creation_time: Time,
    pub author: PersNo,
    pub no_of_lines: u32,
    pub no_of_chars: u32,
    pub no_of_marks: u32,
    pub misc_info: Vec<MiscInfo>,
}

impl WireDecode for TextStatOld {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            creation_time: Time::decode(buf)?,
            author: read_int(buf)?,
            no_of_lines: read_int(buf)?,
            no_of_chars: read_int(buf)?,
            no_of_marks: read_int(buf)?,
            misc_info: read_array(buf, MiscInfo::decode)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mark {
    pub text_no: TextNo,
    pub mark_type: u32,
}

impl WireDecode for Mark {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            text_no: read_int(buf)?,
            mark_type: read_int(buf)?,
        })
    }
}

/// Result of `local-to-global` and `map-created-texts`.
///
/// Both the sparse and the dense block encodings are normalised into
/// `(local, global)` pairs. A global number of zero marks a deleted text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TextMapping {
    pub range_begin: LocalTextNo,
    /// First local number *not* covered by this mapping.
    pub range_end: LocalTextNo,
    pub later_texts_exists: bool,
    pub pairs: Vec<(LocalTextNo, TextNo)>,
}

impl WireDecode for TextMapping {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        let range_begin = read_int(buf)?;
        let range_end = read_int(buf)?;
        let later_texts_exists = read_bool(buf)?;
        let pairs = match read_int(buf)? {
            0 => read_array(buf, |buf| Ok((read_int(buf)?, read_int(buf)?)))?,
            1 => {
                let first_local = read_int(buf)?;
                read_array(buf, read_int)?
                    .into_iter()
                    .zip(first_local..)
                    .map(|(global, local)| (local, global))
                    .collect()
            }
            other => return Err(ProtocolError::UnknownBlockType(other)),
        };
        Ok(Self {
            range_begin,
            range_end,
            later_texts_exists,
            pairs,
        })
    }
}

// =========================================================================
// Conferences and persons
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conference {
    pub name: Hollerith,
    pub conf_type: ExtendedConfType,
    pub creation_time: Time,
    pub last_written: Time,
    pub creator: PersNo,
    pub presentation: TextNo,
    pub supervisor: ConfNo,
    pub permitted_submitters: ConfNo,
    pub super_conf: ConfNo,
    pub msg_of_day: TextNo,
    pub nice: u32,
    pub keep_commented: u32,
    pub no_of_members: u32,
    pub first_local_no: LocalTextNo,
    pub no_of_texts: u32,
    pub expire: u32,
    pub aux_items: Vec<AuxItem>,
}

impl Conference {
    /// Highest local text number in use.
    pub fn highest_local_no(&self) -> LocalTextNo {
        (self.first_local_no + self.no_of_texts).saturating_sub(1)
    }
}

impl WireDecode for Conference {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: Hollerith::decode(buf)?,
            conf_type: ExtendedConfType::decode(buf)?,
            creation_time: Time::decode(buf)?,
            last_written: Time::decode(buf)?,
            creator: read_int(buf)?,
            presentation: read_int(buf)?,
            supervisor: read_int(buf)?,
            permitted_submitters: read_int(buf)?,
            super_conf: read_int(buf)?,
            msg_of_day: read_int(buf)?,
            nice: read_int(buf)?,
            keep_commented: read_int(buf)?,
            no_of_members: read_int(buf)?,
            first_local_no: read_int(buf)?,
            no_of_texts: read_int(buf)?,
            expire: read_int(buf)?,
            aux_items: read_array(buf, AuxItem::decode)?,
        })
    }
}

/// The small conference record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UConference {
    pub name: Hollerith,
    pub conf_type: ExtendedConfType,
    pub highest_local_no: LocalTextNo,
    pub nice: u32,
}

impl WireDecode for UConference {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: Hollerith::decode(buf)?,
            conf_type: ExtendedConfType::decode(buf)?,
            highest_local_no: read_int(buf)?,
            nice: read_int(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub username: Hollerith,
    pub privileges: PrivBits,
    pub flags: PersonalFlags,
    pub last_login: Time,
    pub user_area: TextNo,
    pub total_time_present: u32,
    pub sessions: u32,
    pub created_lines: u32,
    pub created_bytes: u32,
    pub read_texts: u32,
    pub no_of_text_fetches: u32,
    pub created_persons: u32,
    pub created_confs: u32,
    pub first_created_local_no: LocalTextNo,
    pub no_of_created_texts: u32,
    pub no_of_marks: u32,
    pub no_of_confs: u32,
}

impl WireDecode for Person {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: Hollerith::decode(buf)?,
            privileges: PrivBits::decode(buf)?,
            flags: PersonalFlags::decode(buf)?,
            last_login: Time::decode(buf)?,
            user_area: read_int(buf)?,
            total_time_present: read_int(buf)?,
            sessions: read_int(buf)?,
            created_lines: read_int(buf)?,
            created_bytes: read_int(buf)?,
            read_texts: read_int(buf)?,
            no_of_text_fetches: read_int(buf)?,
            created_persons: read_int(buf)?,
            created_confs: read_int(buf)?,
            first_created_local_no: read_int(buf)?,
            no_of_created_texts: read_int(buf)?,
            no_of_marks: read_int(buf)?,
            no_of_confs: read_int(buf)?,
        })
    }
}

/// One hit from `lookup-z-name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfZInfo {
    pub name: Hollerith,
    pub conf_type: ConfType,
    pub conf_no: ConfNo,
}

impl WireDecode for ConfZInfo {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: Hollerith::decode(buf)?,
            conf_type: ConfType::decode(buf)?,
            conf_no: read_int(buf)?,
        })
    }
}

// =========================================================================
// Sessions and server info
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DynamicSessionInfo {
    pub session: SessionNo,
    pub person: PersNo,
    pub working_conference: ConfNo,
    pub idle_time: u32,
    pub flags: SessionFlags,
    pub what_am_i_doing: Hollerith,
}

impl WireDecode for DynamicSessionInfo {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            session: read_int(buf)?,
            person: read_int(buf)?,
            working_conference: read_int(buf)?,
            idle_time: read_int(buf)?,
            flags: SessionFlags::decode(buf)?,
            what_am_i_doing: Hollerith::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticSessionInfo {
    pub username: Hollerith,
    pub hostname: Hollerith,
    pub ident_user: Hollerith,
    pub connection_time: Time,
}

impl WireDecode for StaticSessionInfo {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: Hollerith::decode(buf)?,
            hostname: Hollerith::decode(buf)?,
            ident_user: Hollerith::decode(buf)?,
            connection_time: Time::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhoInfo {
    pub person: PersNo,
    pub working_conference: ConfNo,
    pub session: SessionNo,
    pub what_am_i_doing: Hollerith,
    pub username: Hollerith,
}

impl WireDecode for WhoInfo {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            person: read_int(buf)?,
            working_conference: read_int(buf)?,
            session: read_int(buf)?,
            what_am_i_doing: Hollerith::decode(buf)?,
            username: Hollerith::decode(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub protocol_version: u32,
    pub server_software: Hollerith,
    pub software_version: Hollerith,
}

impl WireDecode for VersionInfo {
    fn decode(buf: &mut StreamBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            protocol_version: read_int(buf)?,
            server_software: Hollerith::decode(buf)?,
            software_version: Hollerith::decode(buf)?,
        })
    }
}
