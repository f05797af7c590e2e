//! Cache invalidation driven by async messages.

use crate::cache::Caches;
use crate::dispatch::{AsyncHandler, HandlerTable};
use crate::membership::MembershipState;
use lyskom_protocol::{AsyncKind, AsyncMessage, MiscInfo};
use std::collections::BTreeSet;
use std::sync::Arc;

const CONFERENCE_DEPS: &[AsyncKind] = &[
    AsyncKind::NewName,
    AsyncKind::DeletedText,
    AsyncKind::NewText,
    AsyncKind::NewRecipient,
    AsyncKind::SubRecipient,
    AsyncKind::NewMembership,
    AsyncKind::LeaveConf,
    AsyncKind::NewPresentation,
    AsyncKind::NewMotd,
];

const UCONFERENCE_DEPS: &[AsyncKind] = &[
    AsyncKind::NewName,
    AsyncKind::DeletedText,
    AsyncKind::NewText,
    AsyncKind::NewRecipient,
    AsyncKind::SubRecipient,
    AsyncKind::NewPresentation,
    AsyncKind::NewMotd,
];

const PERSON_DEPS: &[AsyncKind] = &[AsyncKind::NewUserArea];

const TEXT_STAT_DEPS: &[AsyncKind] = &[
    AsyncKind::DeletedText,
    AsyncKind::NewText,
    AsyncKind::NewRecipient,
    AsyncKind::SubRecipient,
    AsyncKind::TextAuxChanged,
];

const MEMBERSHIP_DEPS: &[AsyncKind] = &[AsyncKind::NewMembership, AsyncKind::LeaveConf];

/// Keeps the session caches consistent with the server.
pub struct CacheCoordinator {
    caches: Arc<Caches>,
    memberships: Arc<MembershipState>,
}

impl CacheCoordinator {
    /// Every kind the coordinator listens to.
    pub const KINDS: &'static [AsyncKind] = &[
        AsyncKind::NewTextOld,
        AsyncKind::NewName,
        AsyncKind::LeaveConf,
        AsyncKind::DeletedText,
        AsyncKind::NewText,
        AsyncKind::NewRecipient,
        AsyncKind::SubRecipient,
        AsyncKind::NewMembership,
        AsyncKind::NewUserArea,
        AsyncKind::NewPresentation,
        AsyncKind::NewMotd,
        AsyncKind::TextAuxChanged,
    ];

    pub fn new(caches: Arc<Caches>, memberships: Arc<MembershipState>) -> Self {
        Self {
            caches,
            memberships,
        }
    }

    /// Subscribes the coordinator to every kind in [`KINDS`](Self::KINDS).
    pub fn register(self: &Arc<Self>, handlers: &mut HandlerTable) {
        for kind in Self::KINDS {
            handlers.register(*kind, self.clone());
        }
    }

    /// Enables exactly the caches whose invalidating kinds have all been
    /// accepted by the server.
    pub fn mark_subscribed(&self, accepted: &BTreeSet<AsyncKind>) {
        let covered = |deps: &[AsyncKind]| deps.iter().all(|kind| accepted.contains(kind));

        self.caches.conferences.set_enabled(covered(CONFERENCE_DEPS));
        self.caches.uconferences.set_enabled(covered(UCONFERENCE_DEPS));
        self.caches.persons.set_enabled(covered(PERSON_DEPS));
        self.caches.text_stats.set_enabled(covered(TEXT_STAT_DEPS));
        self.memberships.set_enabled(covered(MEMBERSHIP_DEPS));
    }

    fn invalidate_conf(&self, conf_no: u32) {
        self.caches.conferences.invalidate(conf_no);
        self.caches.uconferences.invalidate(conf_no);
    }

    fn invalidate_recipients(&self, misc_info: &[MiscInfo]) {
        for conf_no in MiscInfo::recipients(misc_info) {
            self.invalidate_conf(conf_no);
        }
    }

    /// Applies the invalidations implied by one async message.
    pub fn apply(&self, msg: &AsyncMessage) {
        tracing::trace!("Cache invalidation for {}", msg.kind());
        match msg {
            AsyncMessage::NewName { conf_no, .. } => self.invalidate_conf(*conf_no),
            AsyncMessage::DeletedText { text_no, text_stat } => {
                self.invalidate_recipients(&text_stat.misc_info);
                self.caches.text_stats.invalidate(*text_no);
                for related in text_stat.commented().chain(text_stat.comments()) {
                    self.caches.text_stats.invalidate(related);
                }
            }
            AsyncMessage::NewText { text_stat, .. } => {
                self.invalidate_recipients(&text_stat.misc_info);
                for commented in text_stat.commented() {
                    self.caches.text_stats.invalidate(commented);
                }
            }
            AsyncMessage::NewTextOld { text_stat, .. } => {
                self.invalidate_recipients(&text_stat.misc_info);
                for commented in MiscInfo::commented(&text_stat.misc_info) {
                    self.caches.text_stats.invalidate(commented);
                }
            }
            AsyncMessage::NewRecipient {
                text_no, conf_no, ..
            }
            | AsyncMessage::SubRecipient {
                text_no, conf_no, ..
            } => {
                self.invalidate_conf(*conf_no);
                self.caches.text_stats.invalidate(*text_no);
            }
            AsyncMessage::NewMembership { person, conf_no } => {
                self.caches.conferences.invalidate(*conf_no);
                if self.memberships.person() == Some(*person) {
                    self.memberships.invalidate(*conf_no);
                }
            }
            AsyncMessage::LeaveConf { conf_no } => {
                self.caches.conferences.invalidate(*conf_no);
                self.memberships.invalidate(*conf_no);
            }
            AsyncMessage::NewUserArea { person, .. } => self.caches.persons.invalidate(*person),
            AsyncMessage::NewPresentation { conf_no, .. }
            | AsyncMessage::NewMotd { conf_no, .. } => self.invalidate_conf(*conf_no),
            AsyncMessage::TextAuxChanged { text_no, .. } => {
                self.caches.text_stats.invalidate(*text_no)
            }
            _ => {}
        }
    }
}

impl AsyncHandler for CacheCoordinator {
    fn handle(&self, msg: &AsyncMessage) {
        self.apply(msg);
    }
}
