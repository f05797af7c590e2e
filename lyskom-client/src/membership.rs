//! Membership state of the logged-in person.

use crate::cache::{CacheStats, EntityCache};
use lyskom_protocol::{ConfNo, Membership, PersNo};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Per-session cursor state: who is logged in, the current conference and
/// the two membership caches (by conference and by list position).
///
/// Both caches hold data of one person only and are cleared whenever that
/// person changes.
pub struct MembershipState {
    person: AtomicU32,
    current_conference: AtomicU32,
    by_conference: EntityCache<Membership>,
    by_position: Mutex<BTreeMap<u32, Membership>>,
    position_generation: AtomicU64,
    position_enabled: AtomicBool,
}

impl MembershipState {
    pub fn new() -> Self {
        Self {
            person: AtomicU32::new(0),
            current_conference: AtomicU32::new(0),
            // Fetched with query-read-texts, which needs the person as well
            // as the conference, so callers go through `get_with`.
            by_conference: EntityCache::new("membership"),
            by_position: Mutex::new(BTreeMap::new()),
            position_generation: AtomicU64::new(0),
            position_enabled: AtomicBool::new(false),
        }
    }

    /// The logged-in person, if any.
    pub fn person(&self) -> Option<PersNo> {
        match self.person.load(Ordering::Acquire) {
            0 => None,
            person => Some(person),
        }
    }

    /// Records a login or logout and drops everything cached for the
    /// previous person.
    pub fn set_person(&self, person: Option<PersNo>) {
        self.person.store(person.unwrap_or(0), Ordering::Release);
        self.current_conference.store(0, Ordering::Release);
        self.clear();
    }

    pub fn current_conference(&self) -> Option<ConfNo> {
        match self.current_conference.load(Ordering::Acquire) {
            0 => None,
            conf => Some(conf),
        }
    }

    pub fn set_current_conference(&self, conf: ConfNo) {
        self.current_conference.store(conf, Ordering::Release);
    }

    pub fn by_conference(&self) -> &EntityCache<Membership> {
        &self.by_conference
    }

    /// Returns the cached membership at list position `position`.
    pub fn at_position(&self, position: u32) -> Option<Membership> {
        if !self.position_enabled.load(Ordering::Acquire) {
            return None;
        }
        self.by_position.lock().get(&position).cloned()
    }

    /// Token to pass to [`store_position`](Self::store_position); taken
    /// before fetching.
    pub fn position_generation(&self) -> u64 {
        self.position_generation.load(Ordering::Acquire)
    }

    /// Stores a fetched membership unless the position cache was
    /// invalidated after `generation` was taken.
    pub fn store_position(&self, membership: Membership, generation: u64) {
        if !self.position_enabled.load(Ordering::Acquire) {
            return;
        }
        let mut positions = self.by_position.lock();
        if self.position_generation.load(Ordering::Acquire) == generation {
            positions.insert(membership.position, membership);
        }
    }

    /// Drops the membership of `conf` and the whole position cache, whose
    /// positions may all have shifted.
    pub fn invalidate(&self, conf: ConfNo) {
        self.by_conference.invalidate(conf);
        self.invalidate_positions();
    }

    pub fn invalidate_positions(&self) {
        let mut positions = self.by_position.lock();
        self.position_generation.fetch_add(1, Ordering::AcqRel);
        positions.clear();
    }

    /// Number of memberships currently held in the position cache.
    #[cfg(test)]
    pub(crate) fn cached_positions(&self) -> usize {
        self.by_position.lock().len()
    }

    pub fn clear(&self) {
        self.by_conference.invalidate_all();
        self.invalidate_positions();
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.by_conference.set_enabled(enabled);
        self.position_enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.invalidate_positions();
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.by_conference.stats()
    }
}

impl Default for MembershipState {
    fn default() -> Self {
        Self::new()
    }
}
