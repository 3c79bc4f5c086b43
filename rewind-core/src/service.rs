//! Cached stats service.
//!
//! [`StatsService`] answers year-in-review requests. Each request runs:
//!
//! 1. Check the cache (skipped when forced)
//! 2. On a miss, fetch the year's records and the inputs derived stats need
//! 3. Run the calculators and assemble the aggregate
//! 4. Validate, then write the cache
//! 5. Return the aggregate, post-processed if requested
//!
//! Cache failures never fail a request: a broken read is a miss and a broken
//! write is logged. Concurrent misses for one key are collapsed so only one
//! caller computes; later callers wait and then read the fresh entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;

use crate::cache::{CacheEntry, CacheKey, InvalidationFilter, StatsCache};
use crate::codec;
use crate::config::StatsConfig;
use crate::error::{Error, Result};
use crate::source::RecordSource;
use crate::stats::assemble::{self, ServerInputs, UserInputs};
use crate::stats::completion;
use crate::stats::{ServerStats, ShowMetadataLookup, Stats, UserStats, YearFilter};
use crate::types::{PlaybackRecord, ShowMetadata, StatsKind, SubjectId};

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    /// Recompute even when a fresh cache entry exists
    pub force_recalculate: bool,
    /// Override the configured cache TTL
    pub cache_ttl_secs: Option<i64>,
    /// Run the installed post-processor on the returned stats
    pub post_process: bool,
}

impl StatsOptions {
    pub fn forced() -> Self {
        Self {
            force_recalculate: true,
            ..Default::default()
        }
    }
}

/// Transformation applied to returned stats, such as anonymizing names.
///
/// Post-processing only affects the value handed back to the caller. The
/// cached aggregate is always the unprocessed one.
pub trait StatsPostProcessor: Send + Sync {
    fn process_user(&self, stats: UserStats) -> UserStats {
        stats
    }

    fn process_server(&self, stats: ServerStats) -> ServerStats {
        stats
    }
}

/// Year-in-review service over a record source and a stats cache.
pub struct StatsService<R: RecordSource, C: StatsCache> {
    source: R,
    cache: C,
    config: StatsConfig,
    post_processor: Option<Box<dyn StatsPostProcessor>>,
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl<R: RecordSource, C: StatsCache> StatsService<R, C> {
    pub fn new(source: R, cache: C, config: StatsConfig) -> Self {
        Self {
            source,
            cache,
            config,
            post_processor: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Install the post-processor used when [`StatsOptions::post_process`] is set.
    pub fn with_post_processor(mut self, processor: impl StatsPostProcessor + 'static) -> Self {
        self.post_processor = Some(Box::new(processor));
        self
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Year in review for one subject.
    pub fn get_user_stats(
        &self,
        subject_id: SubjectId,
        year: i32,
        options: &StatsOptions,
    ) -> Result<UserStats> {
        let filter = YearFilter::new(year)?;
        let key = CacheKey::user(subject_id, year);
        let stats = self.cached_or_compute(key, options, || {
            self.compute_user(subject_id, &filter).map(Stats::User)
        })?;

        let Stats::User(stats) = stats else {
            return Err(Error::schema(StatsKind::User, "cache returned server stats"));
        };
        Ok(match (&self.post_processor, options.post_process) {
            (Some(processor), true) => processor.process_user(stats),
            _ => stats,
        })
    }

    /// Year in review for the whole server.
    pub fn get_server_stats(&self, year: i32, options: &StatsOptions) -> Result<ServerStats> {
        let filter = YearFilter::new(year)?;
        let key = CacheKey::server(year);
        let stats = self.cached_or_compute(key, options, || {
            self.compute_server(&filter).map(Stats::Server)
        })?;

        let Stats::Server(stats) = stats else {
            return Err(Error::schema(StatsKind::Server, "cache returned user stats"));
        };
        Ok(match (&self.post_processor, options.post_process) {
            (Some(processor), true) => processor.process_server(stats),
            _ => stats,
        })
    }

    /// Remove cached stats. Filters combine with AND; none clears everything.
    pub fn invalidate_cache(&self, subject: Option<SubjectId>, year: Option<i32>) -> Result<usize> {
        let filter = InvalidationFilter {
            subject_id: subject,
            year,
        };
        let removed = self.cache.invalidate(&filter)?;
        tracing::info!(
            subject_id = ?subject,
            year = ?year,
            removed,
            "Invalidated cached stats"
        );
        Ok(removed)
    }

    fn cached_or_compute<F>(&self, key: CacheKey, options: &StatsOptions, compute: F) -> Result<Stats>
    where
        F: FnOnce() -> Result<Stats>,
    {
        let ttl = options.cache_ttl_secs.unwrap_or(self.config.cache_ttl_secs);

        if !options.force_recalculate {
            if let Some(stats) = self.lookup(&key, ttl) {
                return Ok(stats);
            }
        }

        let slot = self.acquire_slot(key);
        let result = {
            let _running = slot.lock().unwrap_or_else(|e| e.into_inner());
            // Another caller may have filled the entry while we waited
            match (!options.force_recalculate)
                .then(|| self.lookup(&key, ttl))
                .flatten()
            {
                Some(stats) => Ok(stats),
                None => self.compute_and_store(key, compute),
            }
        };
        self.release_slot(key, slot);
        result
    }

    fn acquire_slot(&self, key: CacheKey) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.entry(key).or_default().clone()
    }

    fn release_slot(&self, key: CacheKey, slot: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // One reference held by the map, one by us: nobody else is waiting
        if Arc::strong_count(&slot) <= 2 {
            in_flight.remove(&key);
        }
    }

    fn lookup(&self, key: &CacheKey, ttl_secs: i64) -> Option<Stats> {
        let entry = match self.cache.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(key = %key, "Stats cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Stats cache read failed");
                return None;
            }
        };

        if !entry.is_fresh(Utc::now(), ttl_secs) {
            tracing::debug!(
                key = %key,
                calculated_at = %entry.calculated_at,
                ttl_secs,
                "Stats cache entry expired"
            );
            return None;
        }

        match codec::decode_entry(&entry) {
            Ok(stats) => {
                tracing::debug!(key = %key, "Stats cache hit");
                Some(stats)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding malformed stats cache entry");
                None
            }
        }
    }

    fn compute_and_store<F>(&self, key: CacheKey, compute: F) -> Result<Stats>
    where
        F: FnOnce() -> Result<Stats>,
    {
        let start = Instant::now();
        let stats = compute()?;
        let payload_json = codec::encode(&stats)?;

        tracing::info!(
            key = %key,
            plays = stats.totals().total_plays,
            duration_ms = start.elapsed().as_millis() as u64,
            "Computed stats"
        );

        let entry = CacheEntry {
            subject_id: key.subject_id,
            year: key.year,
            stats_kind: key.kind,
            payload_json,
            calculated_at: Utc::now(),
        };
        if let Err(e) = self.cache.put(&entry) {
            tracing::warn!(key = %key, error = %e, "Stats cache write failed");
        }
        Ok(stats)
    }

    /// Fetch records and drop anything the source returned outside the year.
    fn fetch_year(
        &self,
        subject: Option<SubjectId>,
        filter: &YearFilter,
    ) -> Result<Vec<PlaybackRecord>> {
        let mut records = self.source.fetch_records(subject, filter)?;
        let fetched = records.len();
        records.retain(|r| filter.contains(r.viewed_at));
        if records.len() != fetched {
            tracing::warn!(
                year = filter.year,
                dropped = fetched - records.len(),
                "Record source returned plays outside the requested year"
            );
        }
        Ok(records)
    }

    fn previous_minutes(&self, subject: Option<SubjectId>, filter: &YearFilter) -> Result<f64> {
        let previous = filter.previous()?;
        let records = self.fetch_year(subject, &previous)?;
        Ok(assemble::total_minutes(&records))
    }

    fn compute_user(&self, subject_id: SubjectId, filter: &YearFilter) -> Result<UserStats> {
        let records = self.fetch_year(Some(subject_id), filter)?;
        let previous_minutes = self.previous_minutes(Some(subject_id), filter)?;
        let population = self.source.fetch_population_totals(filter)?;

        let progress = completion::show_progress(&records);
        let show_keys = completion::show_keys(&progress, self.config.top_limit);
        let metadata: Option<Result<HashMap<String, ShowMetadata>>> = if show_keys.is_empty() {
            None
        } else {
            Some(self.source.fetch_show_metadata(&show_keys))
        };
        let show_metadata = match &metadata {
            None => ShowMetadataLookup::NotRequested,
            Some(Ok(map)) => ShowMetadataLookup::Available(map),
            Some(Err(e)) => {
                tracing::warn!(
                    subject_id,
                    shows = show_keys.len(),
                    error = %e,
                    "Show metadata unavailable; estimating series completion"
                );
                ShowMetadataLookup::Unavailable
            }
        };

        Ok(assemble::user_stats(
            &UserInputs {
                subject_id,
                filter,
                records: &records,
                previous_minutes,
                population: &population,
                show_metadata,
            },
            &self.config,
        ))
    }

    fn compute_server(&self, filter: &YearFilter) -> Result<ServerStats> {
        let records = self.fetch_year(None, filter)?;
        let previous_minutes = self.previous_minutes(None, filter)?;
        let population = self.source.fetch_population_totals(filter)?;

        Ok(assemble::server_stats(
            &ServerInputs {
                filter,
                records: &records,
                previous_minutes,
                population: &population,
            },
            &self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStatsCache;
    use crate::source::MemoryRecordSource;
    use crate::stats::CompletionSource;
    use crate::types::{ContentType, SubjectTotal};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const JAN_1_2024: i64 = 1_704_067_200;

    fn play(subject_id: SubjectId, key: &str, viewed_at: i64, secs: i64) -> PlaybackRecord {
        PlaybackRecord {
            rating_key: key.to_string(),
            title: format!("Movie {}", key),
            content_type: ContentType::Movie,
            viewed_at,
            duration_seconds: Some(secs),
            subject_id,
            grandparent_title: None,
            grandparent_rating_key: None,
            genres: None,
            release_year: None,
            thumbnail_ref: None,
        }
    }

    fn episode(subject_id: SubjectId, key: &str, viewed_at: i64) -> PlaybackRecord {
        PlaybackRecord {
            content_type: ContentType::Episode,
            grandparent_title: Some("Lost".to_string()),
            grandparent_rating_key: Some("100".to_string()),
            ..play(subject_id, key, viewed_at, 2400)
        }
    }

    fn sample_records() -> Vec<PlaybackRecord> {
        vec![
            play(1, "1", JAN_1_2024 + 3600, 5400),
            play(1, "2", JAN_1_2024 + 86_400, 6000),
            episode(1, "e1", JAN_1_2024 + 2 * 86_400),
            episode(1, "e2", JAN_1_2024 + 2 * 86_400 + 2400),
            play(2, "1", JAN_1_2024 + 7200, 3000),
            // previous year
            play(1, "3", JAN_1_2024 - 86_400, 3000),
        ]
    }

    /// Counts fetches so tests can tell cache hits from recomputation.
    struct CountingSource {
        inner: MemoryRecordSource,
        fetches: AtomicUsize,
    }

    impl CountingSource {
        fn new(inner: MemoryRecordSource) -> Self {
            Self {
                inner,
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl RecordSource for CountingSource {
        fn fetch_records(
            &self,
            subject: Option<SubjectId>,
            filter: &YearFilter,
        ) -> Result<Vec<PlaybackRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.inner.fetch_records(subject, filter)
        }

        fn fetch_population_totals(&self, filter: &YearFilter) -> Result<Vec<SubjectTotal>> {
            self.inner.fetch_population_totals(filter)
        }

        fn fetch_show_metadata(
            &self,
            show_keys: &[String],
        ) -> Result<HashMap<String, ShowMetadata>> {
            self.inner.fetch_show_metadata(show_keys)
        }
    }

    /// Ignores the year filter, like a misbehaving upstream.
    struct LeakySource(Vec<PlaybackRecord>);

    impl RecordSource for LeakySource {
        fn fetch_records(
            &self,
            _subject: Option<SubjectId>,
            _filter: &YearFilter,
        ) -> Result<Vec<PlaybackRecord>> {
            Ok(self.0.clone())
        }

        fn fetch_population_totals(&self, _filter: &YearFilter) -> Result<Vec<SubjectTotal>> {
            Ok(Vec::new())
        }

        fn fetch_show_metadata(
            &self,
            _show_keys: &[String],
        ) -> Result<HashMap<String, ShowMetadata>> {
            Ok(HashMap::new())
        }
    }

    /// Cache that fails every operation.
    struct BrokenCache;

    impl StatsCache for BrokenCache {
        fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")))
        }

        fn put(&self, _entry: &CacheEntry) -> Result<()> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")))
        }

        fn invalidate(&self, _filter: &InvalidationFilter) -> Result<usize> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")))
        }
    }

    struct Anonymize;

    impl StatsPostProcessor for Anonymize {
        fn process_server(&self, mut stats: ServerStats) -> ServerStats {
            for subject in &mut stats.top_subjects {
                subject.name = format!("Viewer #{}", subject.rank);
            }
            stats
        }
    }

    fn service() -> StatsService<Arc<CountingSource>, MemoryStatsCache> {
        let source = MemoryRecordSource::new(sample_records())
            .with_name(1, "alice")
            .with_name(2, "bob")
            .with_show_metadata("100", 8);
        StatsService::new(
            Arc::new(CountingSource::new(source)),
            MemoryStatsCache::new(),
            StatsConfig::default(),
        )
    }

    #[test]
    fn test_user_stats_computed_and_cached() {
        crate::logging::init_test();
        let service = service();
        let stats = service
            .get_user_stats(1, 2024, &StatsOptions::default())
            .unwrap();
        assert_eq!(stats.subject_id, 1);
        assert_eq!(stats.totals.total_plays, 4);
        assert_eq!(stats.totals.total_watch_minutes, 90.0 + 100.0 + 80.0);
        assert_eq!(stats.percentile, 50.0);
        let comparison = stats.year_comparison.as_ref().unwrap();
        assert_eq!(comparison.previous_minutes, 50.0);
        assert_eq!(stats.series_completion[0].total_episodes, 8);
        assert_eq!(stats.series_completion[0].source, CompletionSource::Metadata);

        let fetches = service.source().fetches();
        let cached = service
            .get_user_stats(1, 2024, &StatsOptions::default())
            .unwrap();
        assert_eq!(cached, stats);
        assert_eq!(service.source().fetches(), fetches);
    }

    #[test]
    fn test_force_recalculate_bypasses_cache() {
        let service = service();
        service
            .get_user_stats(1, 2024, &StatsOptions::default())
            .unwrap();
        let fetches = service.source().fetches();
        service
            .get_user_stats(1, 2024, &StatsOptions::forced())
            .unwrap();
        assert!(service.source().fetches() > fetches);
    }

    #[test]
    fn test_expired_entry_is_recomputed() {
        let service = service();
        let key = CacheKey::user(1, 2024);
        service
            .get_user_stats(1, 2024, &StatsOptions::default())
            .unwrap();

        let mut entry = service.cache().get(&key).unwrap().unwrap();
        entry.calculated_at = Utc::now() - Duration::seconds(120);
        service.cache().put(&entry).unwrap();

        let options = StatsOptions {
            cache_ttl_secs: Some(60),
            ..Default::default()
        };
        let fetches = service.source().fetches();
        service.get_user_stats(1, 2024, &options).unwrap();
        assert!(service.source().fetches() > fetches);
        let refreshed = service.cache().get(&key).unwrap().unwrap();
        assert!(refreshed.is_fresh(Utc::now(), 60));
    }

    #[test]
    fn test_malformed_entry_is_a_miss() {
        let service = service();
        service
            .cache()
            .put(&CacheEntry {
                subject_id: Some(1),
                year: 2024,
                stats_kind: StatsKind::User,
                payload_json: "{\"statsKind\":\"user\",\"year\":\"oops\"}".to_string(),
                calculated_at: Utc::now(),
            })
            .unwrap();

        let stats = service
            .get_user_stats(1, 2024, &StatsOptions::default())
            .unwrap();
        assert_eq!(stats.totals.total_plays, 4);
        let entry = service.cache().get(&CacheKey::user(1, 2024)).unwrap().unwrap();
        assert!(codec::decode_entry(&entry).is_ok());
    }

    #[test]
    fn test_cache_failures_do_not_fail_requests() {
        let service = StatsService::new(
            MemoryRecordSource::new(sample_records()),
            BrokenCache,
            StatsConfig::default(),
        );
        let stats = service.get_server_stats(2024, &StatsOptions::default()).unwrap();
        assert_eq!(stats.totals.total_plays, 5);
        assert!(service.invalidate_cache(None, None).is_err());
    }

    #[test]
    fn test_metadata_outage_estimates_completion() {
        let service = StatsService::new(
            MemoryRecordSource::new(sample_records()).without_metadata(),
            MemoryStatsCache::new(),
            StatsConfig::default(),
        );
        let stats = service
            .get_user_stats(1, 2024, &StatsOptions::default())
            .unwrap();
        let lost = &stats.series_completion[0];
        assert_eq!(lost.source, CompletionSource::Estimated);
        assert_eq!(lost.total_episodes, 2);
        assert_eq!(lost.percent, 100.0);
    }

    #[test]
    fn test_records_outside_year_are_dropped() {
        let service = StatsService::new(
            LeakySource(sample_records()),
            MemoryStatsCache::new(),
            StatsConfig::default(),
        );
        let stats = service
            .get_server_stats(2024, &StatsOptions::default())
            .unwrap();
        assert_eq!(stats.totals.total_plays, 5);
        assert_eq!(stats.year_comparison.unwrap().previous_minutes, 50.0);
    }

    #[test]
    fn test_server_stats_rank_subjects() {
        let service = service();
        let stats = service
            .get_server_stats(2024, &StatsOptions::default())
            .unwrap();
        assert_eq!(stats.total_subjects, 2);
        assert_eq!(stats.top_subjects[0].name, "alice");
        assert_eq!(stats.top_subjects[1].name, "bob");
        assert_eq!(stats.top_movies[0].title, "Movie 1");
        assert_eq!(stats.top_movies[0].count, 2);
    }

    #[test]
    fn test_post_processing_is_not_cached() {
        let service = service().with_post_processor(Anonymize);
        let options = StatsOptions {
            post_process: true,
            ..Default::default()
        };
        let anonymized = service.get_server_stats(2024, &options).unwrap();
        assert_eq!(anonymized.top_subjects[0].name, "Viewer #1");

        let raw = service
            .get_server_stats(2024, &StatsOptions::default())
            .unwrap();
        assert_eq!(raw.top_subjects[0].name, "alice");

        let entry = service.cache().get(&CacheKey::server(2024)).unwrap().unwrap();
        assert!(entry.payload_json.contains("alice"));
    }

    #[test]
    fn test_invalidate_scopes() {
        let service = service();
        let options = StatsOptions::default();
        service.get_user_stats(1, 2024, &options).unwrap();
        service.get_user_stats(2, 2024, &options).unwrap();
        service.get_user_stats(1, 2023, &options).unwrap();
        service.get_server_stats(2024, &options).unwrap();

        assert_eq!(service.invalidate_cache(Some(1), None).unwrap(), 2);
        assert_eq!(service.invalidate_cache(None, Some(2024)).unwrap(), 2);
        assert!(service.cache().is_empty());
    }

    #[test]
    fn test_invalid_year() {
        let service = service();
        assert!(matches!(
            service.get_user_stats(1, i32::MAX, &StatsOptions::default()),
            Err(Error::InvalidYear(_))
        ));
    }

    #[test]
    fn test_concurrent_misses_compute_once() {
        let service = Arc::new(service());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    service
                        .get_user_stats(1, 2024, &StatsOptions::default())
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<UserStats> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        // One computation: current year plus previous year
        assert_eq!(service.source().fetches(), 2);
        assert!(service.in_flight.lock().unwrap().is_empty());
    }
}
