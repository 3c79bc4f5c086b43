//! Stats cache storage.
//!
//! A cache holds exactly one [`CacheEntry`] per [`CacheKey`]. Writes replace
//! the previous entry for the key in a single step, so readers see either the
//! old payload or the new one.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::types::{StatsKind, SubjectId};

/// Identity of one cached aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// None for server-wide stats
    pub subject_id: Option<SubjectId>,
    pub year: i32,
    pub kind: StatsKind,
}

impl CacheKey {
    pub fn user(subject_id: SubjectId, year: i32) -> Self {
        Self {
            subject_id: Some(subject_id),
            year,
            kind: StatsKind::User,
        }
    }

    pub fn server(year: i32) -> Self {
        Self {
            subject_id: None,
            year,
            kind: StatsKind::Server,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.subject_id {
            Some(id) => write!(f, "{}:{}:{}", self.kind, id, self.year),
            None => write!(f, "{}:{}", self.kind, self.year),
        }
    }
}

/// A persisted aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub subject_id: Option<SubjectId>,
    pub year: i32,
    pub stats_kind: StatsKind,
    /// Encoded aggregate (see [`crate::codec`])
    pub payload_json: String,
    pub calculated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn key(&self) -> CacheKey {
        CacheKey {
            subject_id: self.subject_id,
            year: self.year,
            kind: self.stats_kind,
        }
    }

    /// Whether the entry is still within `ttl_secs` of its calculation.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        is_fresh(self.calculated_at, now, ttl_secs)
    }
}

/// `now - calculated_at <= ttl`. Entries from the future count as fresh.
pub fn is_fresh(calculated_at: DateTime<Utc>, now: DateTime<Utc>, ttl_secs: i64) -> bool {
    let max_secs = i64::MAX / 1000;
    now - calculated_at <= Duration::seconds(ttl_secs.clamp(-max_secs, max_secs))
}

/// Which entries an invalidation removes. Set fields combine with AND;
/// an empty filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationFilter {
    pub subject_id: Option<SubjectId>,
    pub year: Option<i32>,
}

impl InvalidationFilter {
    pub fn matches(&self, key: &CacheKey) -> bool {
        let subject_ok = match self.subject_id {
            Some(id) => key.subject_id == Some(id),
            None => true,
        };
        let year_ok = self.year.map_or(true, |y| key.year == y);
        subject_ok && year_ok
    }
}

/// Storage for computed aggregates.
pub trait StatsCache: Send + Sync {
    /// Load the entry for `key`, if any.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or replace the entry for its key.
    fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Delete matching entries, returning how many were removed.
    fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize>;
}

/// Process-local cache, used in tests and when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStatsCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StatsCache for MemoryStatsCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(entry.key(), entry.clone());
        Ok(())
    }

    fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !filter.matches(key));
        Ok(before - entries.len())
    }
}

impl<C: StatsCache + ?Sized> StatsCache for std::sync::Arc<C> {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        (**self).get(key)
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        (**self).put(entry)
    }

    fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize> {
        (**self).invalidate(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: CacheKey, calculated_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            subject_id: key.subject_id,
            year: key.year,
            stats_kind: key.kind,
            payload_json: "{}".to_string(),
            calculated_at,
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let calculated = Utc::now();
        let ttl = 3600;
        assert!(is_fresh(calculated, calculated + Duration::seconds(ttl - 1), ttl));
        assert!(is_fresh(calculated, calculated + Duration::seconds(ttl), ttl));
        assert!(!is_fresh(calculated, calculated + Duration::seconds(ttl + 1), ttl));
    }

    #[test]
    fn test_freshness_counts_sub_second_age() {
        let calculated = Utc::now();
        let ttl = 60;
        let just_over = calculated + Duration::seconds(ttl) + Duration::milliseconds(500);
        let just_under = calculated + Duration::seconds(ttl) - Duration::milliseconds(500);
        assert!(!is_fresh(calculated, just_over, ttl));
        assert!(is_fresh(calculated, just_under, ttl));
    }

    #[test]
    fn test_freshness_with_extreme_ttl() {
        let calculated = Utc::now();
        assert!(is_fresh(calculated, calculated + Duration::days(365), i64::MAX));
        assert!(!is_fresh(calculated, calculated, i64::MIN));
    }

    #[test]
    fn test_put_replaces_entry() {
        let cache = MemoryStatsCache::new();
        let key = CacheKey::user(1, 2024);
        let now = Utc::now();
        cache.put(&entry(key, now - Duration::hours(1))).unwrap();
        cache.put(&entry(key, now)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().unwrap().calculated_at, now);
    }

    #[test]
    fn test_user_and_server_keys_are_distinct() {
        let cache = MemoryStatsCache::new();
        let now = Utc::now();
        cache.put(&entry(CacheKey::user(1, 2024), now)).unwrap();
        cache.put(&entry(CacheKey::server(2024), now)).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&CacheKey::user(2, 2024)).unwrap().is_none());
    }

    #[test]
    fn test_invalidation_scoping() {
        let cache = MemoryStatsCache::new();
        let now = Utc::now();
        for key in [
            CacheKey::user(5, 2023),
            CacheKey::user(5, 2024),
            CacheKey::user(6, 2024),
            CacheKey::server(2024),
        ] {
            cache.put(&entry(key, now)).unwrap();
        }

        let removed = cache
            .invalidate(&InvalidationFilter {
                subject_id: Some(5),
                year: None,
            })
            .unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get(&CacheKey::user(6, 2024)).unwrap().is_some());

        let removed = cache
            .invalidate(&InvalidationFilter {
                subject_id: None,
                year: Some(2023),
            })
            .unwrap();
        assert_eq!(removed, 0);

        let removed = cache.invalidate(&InvalidationFilter::default()).unwrap();
        assert_eq!(removed, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(CacheKey::user(7, 2024).to_string(), "user:7:2024");
        assert_eq!(CacheKey::server(2024).to_string(), "server:2024");
    }
}
