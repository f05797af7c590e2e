//! Read-through entity caches.
//!
//! Entries are only ever removed by invalidation; nothing expires. A cache
//! starts out disabled and is switched on once the server has agreed to send
//! every async message that can invalidate it. While disabled it fetches on
//! every call and stores nothing.

use crate::client::Client;
use crate::error::ClientError;
use dashmap::DashMap;
use lyskom_protocol::{Conference, Person, Reply, Request, TextStat, UConference};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Hit/miss counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub enabled: bool,
}

/// An entity that can be fetched by number alone.
pub trait CachedEntity: Clone + TryFrom<Reply, Error = Reply> {
    fn fetch_request(id: u32) -> Request;
}

impl CachedEntity for Conference {
    fn fetch_request(id: u32) -> Request {
        Request::get_conf_stat(id)
    }
}

impl CachedEntity for UConference {
    fn fetch_request(id: u32) -> Request {
        Request::get_uconf_stat(id)
    }
}

impl CachedEntity for Person {
    fn fetch_request(id: u32) -> Request {
        Request::get_person_stat(id)
    }
}

impl CachedEntity for TextStat {
    fn fetch_request(id: u32) -> Request {
        Request::get_text_stat(id)
    }
}

/// A cache of values keyed by conference, person or text number.
pub struct EntityCache<V> {
    name: &'static str,
    entries: DashMap<u32, V>,
    enabled: AtomicBool,
    /// Bumped on every invalidation so that a fetch which raced with one
    /// does not store the value it read before.
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> EntityCache<V> {
    /// Creates a disabled cache.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            enabled: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value or fetches it through `client`.
    pub async fn get(&self, client: &Client, id: u32) -> Result<V, ClientError>
    where
        V: CachedEntity,
    {
        self.get_with(id, move || client.request_as::<V>(V::fetch_request(id)))
            .await
    }

    /// Returns the cached value or awaits `fetch`, storing its result on
    /// success. A failed fetch leaves the cache unchanged.
    pub async fn get_with<F, Fut>(&self, id: u32, fetch: F) -> Result<V, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClientError>>,
    {
        let enabled = self.is_enabled();
        if enabled {
            if let Some(value) = self.peek(id) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("{} cache hit for {}", self.name, id);
                return Ok(value);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("{} cache miss for {}", self.name, id);
        let generation = self.generation.load(Ordering::Acquire);
        let value = fetch().await?;

        if enabled && self.is_enabled() && self.generation.load(Ordering::Acquire) == generation {
            self.entries.insert(id, value.clone());
        }
        Ok(value)
    }

    /// Returns the cached value without fetching.
    pub fn peek(&self, id: u32) -> Option<V> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn invalidate(&self, id: u32) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if self.entries.remove(&id).is_some() {
            tracing::trace!("{} cache invalidated {}", self.name, id);
        }
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enables or disables the cache. Disabling drops every entry.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::AcqRel);
        if was && !enabled {
            self.invalidate_all();
        }
        if was != enabled {
            tracing::debug!(
                "{} cache {}",
                self.name,
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            enabled: self.is_enabled(),
        }
    }
}

/// The entity caches of a session.
pub struct Caches {
    pub conferences: EntityCache<Conference>,
    pub uconferences: EntityCache<UConference>,
    pub persons: EntityCache<Person>,
    pub text_stats: EntityCache<TextStat>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            conferences: EntityCache::new("conference"),
            uconferences: EntityCache::new("uconference"),
            persons: EntityCache::new("person"),
            text_stats: EntityCache::new("text-stat"),
        }
    }

    /// Drops every entry of every cache.
    pub fn clear(&self) {
        self.conferences.invalidate_all();
        self.uconferences.invalidate_all();
        self.persons.invalidate_all();
        self.text_stats.invalidate_all();
    }

    /// Disables every cache.
    pub fn disable_all(&self) {
        self.conferences.set_enabled(false);
        self.uconferences.set_enabled(false);
        self.persons.set_enabled(false);
        self.text_stats.set_enabled(false);
    }

    pub fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.conferences.name(), self.conferences.stats()),
            (self.uconferences.name(), self.uconferences.stats()),
            (self.persons.name(), self.persons.stats()),
            (self.text_stats.name(), self.text_stats.stats()),
        ]
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyskom_protocol::ErrorCode;
    use std::sync::atomic::AtomicU32;

    fn cache() -> EntityCache<u32> {
        let cache = EntityCache::new("test");
        cache.set_enabled(true);
        cache
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let cache = cache();
        let counter = AtomicU32::new(0);
        let fetches = &counter;
        let fetch = move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ClientError>(42)
        };

        assert_eq!(cache.get_with(1, fetch).await.unwrap(), 42);
        assert_eq!(cache.get_with(1, fetch).await.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_not_stored() {
        let cache = cache();
        let result = cache
            .get_with(7, || async {
                Err(ClientError::Server {
                    code: ErrorCode::UndefinedConference,
                    detail: 7,
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.peek(7), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let cache = cache();
        cache.get_with(3, || async { Ok(1) }).await.unwrap();
        cache.invalidate(3);
        // Invalidating again is harmless
        cache.invalidate(3);
        assert_eq!(cache.get_with(3, || async { Ok(2) }).await.unwrap(), 2);
        assert_eq!(cache.peek(3), Some(2));

        cache.invalidate_all();
        assert_eq!(cache.peek(3), None);
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_discards_value() {
        let cache = cache();
        let shared = &cache;
        let value = cache
            .get_with(5, move || async move {
                shared.invalidate(5);
                Ok(10)
            })
            .await
            .unwrap();
        assert_eq!(value, 10);
        assert_eq!(cache.peek(5), None);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache: EntityCache<u32> = EntityCache::new("test");
        assert!(!cache.is_enabled());
        cache.get_with(1, || async { Ok(1) }).await.unwrap();
        cache.get_with(1, || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.peek(1), None);
        assert_eq!(cache.stats().misses, 2);

        cache.set_enabled(true);
        cache.get_with(1, || async { Ok(3) }).await.unwrap();
        assert_eq!(cache.peek(1), Some(3));

        cache.set_enabled(false);
        assert_eq!(cache.peek(1), None);
    }
}
