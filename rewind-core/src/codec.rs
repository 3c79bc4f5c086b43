//! JSON encoding of computed stats.
//!
//! Every aggregate is validated against its output shape before it is
//! encoded and after it is decoded. A payload that passes [`validate`]
//! decodes back to a value equal to the one encoded.

use crate::cache::{CacheEntry, CacheKey};
use crate::error::{Error, Result};
use crate::stats::distribution::{HOUR_BUCKETS, MONTH_BUCKETS, WEEKDAY_BUCKETS};
use crate::stats::{
    BingeSession, ContentTypeBreakdown, DecadeBucket, Histogram, MarathonDay, RankedItem,
    RewatchItem, SeriesCompletion, ServerStats, Stats, SubjectRanking, UserStats, WatchStreak,
    WatchTotals,
};
use crate::types::StatsKind;

/// Relative tolerance for comparing sums of minutes.
const MINUTES_TOLERANCE: f64 = 1e-6;

/// Encode stats as JSON, validating first.
pub fn encode(stats: &Stats) -> Result<String> {
    validate(stats)?;
    Ok(serde_json::to_string(stats)?)
}

/// Decode and validate stats from JSON.
pub fn decode(json: &str) -> Result<Stats> {
    let stats: Stats = serde_json::from_str(json)?;
    validate(&stats)?;
    Ok(stats)
}

/// Decode a cache entry, checking the payload belongs to the entry's key.
pub fn decode_entry(entry: &CacheEntry) -> Result<Stats> {
    let stats = decode(&entry.payload_json)?;
    let found = CacheKey {
        subject_id: stats.subject_id(),
        year: stats.year(),
        kind: stats.kind(),
    };
    if found != entry.key() {
        return Err(Error::schema(
            entry.stats_kind,
            format!("payload for {} stored under {}", found, entry.key()),
        ));
    }
    Ok(stats)
}

/// Check an aggregate against its output shape.
pub fn validate(stats: &Stats) -> Result<()> {
    let result = match stats {
        Stats::User(user) => validate_user(user),
        Stats::Server(server) => validate_server(server),
    };
    result.map_err(|message| Error::schema(stats.kind(), message))
}

/// Validate user stats on their own.
pub fn validate_user_stats(stats: &UserStats) -> Result<()> {
    validate_user(stats).map_err(|message| Error::schema(StatsKind::User, message))
}

/// Validate server stats on their own.
pub fn validate_server_stats(stats: &ServerStats) -> Result<()> {
    validate_server(stats).map_err(|message| Error::schema(StatsKind::Server, message))
}

type Check = std::result::Result<(), String>;

fn validate_user(stats: &UserStats) -> Check {
    check_totals(&stats.totals)?;
    check_histogram("monthly", &stats.monthly, MONTH_BUCKETS, &stats.totals)?;
    check_histogram("hourly", &stats.hourly, HOUR_BUCKETS, &stats.totals)?;
    check_histogram("weekday", &stats.weekday, WEEKDAY_BUCKETS, &stats.totals)?;
    check_ranked("topMovies", &stats.top_movies)?;
    check_ranked("topShows", &stats.top_shows)?;
    check_ranked("topArtists", &stats.top_artists)?;
    check_ranked("topGenres", &stats.top_genres)?;
    check_rewatches(&stats.top_rewatches)?;
    check_breakdown(&stats.content_types, &stats.totals)?;
    check_decades(&stats.decades)?;
    if let Some(binge) = &stats.longest_binge {
        check_binge(binge)?;
    }
    if stats.longest_binge.is_none() && stats.binge_sessions > 0 {
        return Err("binge sessions counted without a longest binge".to_string());
    }
    if let Some(day) = &stats.marathon_day {
        check_marathon(day)?;
    }
    if let Some(streak) = &stats.watch_streak {
        check_streak(streak)?;
    }
    if stats.totals.total_plays == 0
        && (stats.first_watch.is_some() || stats.last_watch.is_some())
    {
        return Err("first/last watch present without plays".to_string());
    }
    if let (Some(first), Some(last)) = (&stats.first_watch, &stats.last_watch) {
        if last.viewed_at < first.viewed_at {
            return Err("lastWatch precedes firstWatch".to_string());
        }
    }
    if !stats.percentile.is_finite() || !(0.0..=100.0).contains(&stats.percentile) {
        return Err(format!("percentile {} outside 0-100", stats.percentile));
    }
    if let Some(cmp) = &stats.year_comparison {
        check_finite("yearComparison.percentChange", cmp.percent_change)?;
        check_non_negative("yearComparison.previousMinutes", cmp.previous_minutes)?;
    }
    for completion in &stats.series_completion {
        check_completion(completion)?;
    }
    Ok(())
}

fn validate_server(stats: &ServerStats) -> Check {
    check_totals(&stats.totals)?;
    check_histogram("monthly", &stats.monthly, MONTH_BUCKETS, &stats.totals)?;
    check_histogram("hourly", &stats.hourly, HOUR_BUCKETS, &stats.totals)?;
    check_histogram("weekday", &stats.weekday, WEEKDAY_BUCKETS, &stats.totals)?;
    check_subjects(&stats.top_subjects)?;
    if stats.top_subjects.len() > stats.total_subjects as usize {
        return Err(format!(
            "{} ranked subjects but totalSubjects is {}",
            stats.top_subjects.len(),
            stats.total_subjects
        ));
    }
    check_ranked("topMovies", &stats.top_movies)?;
    check_ranked("topShows", &stats.top_shows)?;
    check_ranked("topArtists", &stats.top_artists)?;
    check_ranked("topGenres", &stats.top_genres)?;
    check_breakdown(&stats.content_types, &stats.totals)?;
    check_decades(&stats.decades)?;
    if let Some(day) = &stats.marathon_day {
        check_marathon(day)?;
    }
    if let Some(cmp) = &stats.year_comparison {
        check_finite("yearComparison.percentChange", cmp.percent_change)?;
        check_non_negative("yearComparison.previousMinutes", cmp.previous_minutes)?;
    }
    Ok(())
}

fn check_finite(field: &str, value: f64) -> Check {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{} is not finite", field))
    }
}

fn check_non_negative(field: &str, value: f64) -> Check {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(format!("{} is negative", field));
    }
    Ok(())
}

fn minutes_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= MINUTES_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn check_totals(totals: &WatchTotals) -> Check {
    check_non_negative("totalWatchMinutes", totals.total_watch_minutes)?;
    if totals.unique_titles > totals.total_plays {
        return Err("uniqueTitles exceeds totalPlays".to_string());
    }
    if totals.days_active > totals.total_plays {
        return Err("daysActive exceeds totalPlays".to_string());
    }
    Ok(())
}

fn check_histogram(name: &str, hist: &Histogram, len: usize, totals: &WatchTotals) -> Check {
    if hist.minutes.len() != len || hist.plays.len() != len {
        return Err(format!(
            "{} histogram has {}/{} buckets, expected {}",
            name,
            hist.minutes.len(),
            hist.plays.len(),
            len
        ));
    }
    for &minutes in &hist.minutes {
        check_non_negative(name, minutes)?;
    }
    if hist.total_plays() != totals.total_plays {
        return Err(format!(
            "{} plays sum to {}, expected {}",
            name,
            hist.total_plays(),
            totals.total_plays
        ));
    }
    if !minutes_match(hist.total_minutes(), totals.total_watch_minutes) {
        return Err(format!(
            "{} minutes sum to {}, expected {}",
            name,
            hist.total_minutes(),
            totals.total_watch_minutes
        ));
    }
    Ok(())
}

fn check_ranks<I>(name: &str, ranks: I) -> Check
where
    I: IntoIterator<Item = u32>,
{
    for (i, rank) in ranks.into_iter().enumerate() {
        if rank as usize != i + 1 {
            return Err(format!("{} rank {} at position {}", name, rank, i + 1));
        }
    }
    Ok(())
}

fn check_descending<I>(name: &str, counts: I) -> Check
where
    I: IntoIterator<Item = u32>,
{
    let mut prev: Option<u32> = None;
    for count in counts {
        if prev.is_some_and(|p| count > p) {
            return Err(format!("{} not sorted by count", name));
        }
        prev = Some(count);
    }
    Ok(())
}

fn check_ranked(name: &str, items: &[RankedItem]) -> Check {
    check_ranks(name, items.iter().map(|i| i.rank))?;
    check_descending(name, items.iter().map(|i| i.count))
}

fn check_rewatches(items: &[RewatchItem]) -> Check {
    check_ranks("topRewatches", items.iter().map(|i| i.rank))?;
    check_descending("topRewatches", items.iter().map(|i| i.count))?;
    if let Some(item) = items.iter().find(|i| i.count < 2) {
        return Err(format!("rewatch {} played {} time(s)", item.rating_key, item.count));
    }
    Ok(())
}

fn check_subjects(items: &[SubjectRanking]) -> Check {
    check_ranks("topSubjects", items.iter().map(|i| i.rank))?;
    let mut prev: Option<f64> = None;
    for item in items {
        check_non_negative("topSubjects.totalMinutes", item.total_minutes)?;
        if prev.is_some_and(|p| item.total_minutes > p) {
            return Err("topSubjects not sorted by minutes".to_string());
        }
        prev = Some(item.total_minutes);
    }
    Ok(())
}

fn check_breakdown(breakdown: &ContentTypeBreakdown, totals: &WatchTotals) -> Check {
    if breakdown.total_count() != totals.total_plays {
        return Err(format!(
            "content types count {} plays, expected {}",
            breakdown.total_count(),
            totals.total_plays
        ));
    }
    for part in [&breakdown.movie, &breakdown.episode, &breakdown.track] {
        check_non_negative("contentTypes.minutes", part.minutes)?;
    }
    Ok(())
}

fn check_decades(decades: &[DecadeBucket]) -> Check {
    for pair in decades.windows(2) {
        if pair[0].decade >= pair[1].decade {
            return Err("decades not ascending".to_string());
        }
    }
    if let Some(bucket) = decades.iter().find(|d| d.decade.rem_euclid(10) != 0) {
        return Err(format!("decade {} is not a multiple of ten", bucket.decade));
    }
    Ok(())
}

fn check_binge(binge: &BingeSession) -> Check {
    if binge.end_time < binge.start_time {
        return Err("binge ends before it starts".to_string());
    }
    if binge.plays == 0 {
        return Err("binge without plays".to_string());
    }
    check_non_negative("longestBinge.totalMinutes", binge.total_minutes)
}

fn check_marathon(day: &MarathonDay) -> Check {
    check_non_negative("marathonDay.totalMinutes", day.total_minutes)?;
    if day.items.len() > day.plays as usize {
        return Err("marathon day lists more items than plays".to_string());
    }
    if day.items.windows(2).any(|w| w[1].viewed_at < w[0].viewed_at) {
        return Err("marathon items not chronological".to_string());
    }
    Ok(())
}

fn check_streak(streak: &WatchStreak) -> Check {
    let span = (streak.end_date - streak.start_date).num_days() + 1;
    if span < 1 || span != streak.longest_streak as i64 {
        return Err(format!(
            "streak of {} days spans {} to {}",
            streak.longest_streak, streak.start_date, streak.end_date
        ));
    }
    Ok(())
}

fn check_completion(completion: &SeriesCompletion) -> Check {
    if completion.watched_episodes > completion.total_episodes {
        return Err(format!(
            "{} watched {} of {} episodes",
            completion.show_title, completion.watched_episodes, completion.total_episodes
        ));
    }
    if !(0.0..=100.0).contains(&completion.percent) {
        return Err(format!("{} completion {}%", completion.show_title, completion.percent));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsConfig;
    use crate::stats::assemble::{self, ServerInputs, UserInputs};
    use crate::stats::{ShowMetadataLookup, YearFilter};
    use crate::types::{ContentType, PlaybackRecord, SubjectTotal};
    use chrono::Utc;

    fn record(key: &str, content_type: ContentType, viewed_at: i64, secs: i64) -> PlaybackRecord {
        PlaybackRecord {
            rating_key: key.to_string(),
            title: format!("Title {}", key),
            content_type,
            viewed_at,
            duration_seconds: Some(secs),
            subject_id: 1,
            grandparent_title: None,
            grandparent_rating_key: None,
            genres: Some(vec!["Drama".to_string()]),
            release_year: Some(1999),
            thumbnail_ref: Some(format!("/thumb/{}", key)),
        }
    }

    fn sample_records() -> Vec<PlaybackRecord> {
        // Odd durations so minute sums are not exact binary fractions
        vec![
            record("1", ContentType::Movie, 1_704_103_200, 7_201),
            record("2", ContentType::Episode, 1_704_110_000, 1_337),
            record("2", ContentType::Episode, 1_710_000_000, 1_337),
            record("3", ContentType::Track, 1_720_000_000, 211),
            record("4", ContentType::Movie, 1_735_689_000, 5_399),
        ]
    }

    fn user_stats() -> UserStats {
        let filter = YearFilter::new(2024).unwrap();
        let records = sample_records();
        let population = vec![
            SubjectTotal {
                subject_id: 1,
                name: None,
                total_minutes: assemble::total_minutes(&records),
            },
            SubjectTotal {
                subject_id: 2,
                name: Some("Other".to_string()),
                total_minutes: 12.5,
            },
        ];
        assemble::user_stats(
            &UserInputs {
                subject_id: 1,
                filter: &filter,
                records: &records,
                previous_minutes: 33.3,
                population: &population,
                show_metadata: ShowMetadataLookup::NotRequested,
            },
            &StatsConfig::default(),
        )
    }

    fn server_stats() -> ServerStats {
        let filter = YearFilter::new(2024).unwrap();
        let records = sample_records();
        let population = assemble::population_from_records(&records);
        assemble::server_stats(
            &ServerInputs {
                filter: &filter,
                records: &records,
                previous_minutes: 0.0,
                population: &population,
            },
            &StatsConfig::default(),
        )
    }

    #[test]
    fn test_round_trip_user_stats() {
        let stats = Stats::User(user_stats());
        let mut json = encode(&stats).unwrap();
        for _ in 0..3 {
            let decoded = decode(&json).unwrap();
            assert_eq!(decoded, stats);
            json = encode(&decoded).unwrap();
        }
    }

    #[test]
    fn test_round_trip_server_stats() {
        let stats = Stats::Server(server_stats());
        let json = encode(&stats).unwrap();
        assert!(json.contains("\"statsKind\":\"server\""));
        assert_eq!(decode(&json).unwrap(), stats);
    }

    #[test]
    fn test_round_trip_empty_stats() {
        let filter = YearFilter::new(2024).unwrap();
        let stats = Stats::User(assemble::user_stats(
            &UserInputs {
                subject_id: 9,
                filter: &filter,
                records: &[],
                previous_minutes: 0.0,
                population: &[],
                show_metadata: ShowMetadataLookup::NotRequested,
            },
            &StatsConfig::default(),
        ));
        let json = encode(&stats).unwrap();
        assert!(json.contains("\"longestBinge\":null"));
        assert_eq!(decode(&json).unwrap(), stats);
    }

    #[test]
    fn test_encode_uses_camel_case() {
        let json = encode(&Stats::User(user_stats())).unwrap();
        assert!(json.contains("\"statsKind\":\"user\""));
        assert!(json.contains("\"totalWatchMinutes\""));
        assert!(json.contains("\"topMovies\""));
        assert!(!json.contains("total_watch_minutes"));
    }

    #[test]
    fn test_rejects_short_histogram() {
        let mut stats = user_stats();
        stats.hourly.minutes.pop();
        stats.hourly.plays.pop();
        let err = encode(&Stats::User(stats)).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));
    }

    #[test]
    fn test_rejects_histogram_sum_mismatch() {
        let mut stats = user_stats();
        stats.monthly.plays[0] += 1;
        assert!(validate_user_stats(&stats).is_err());
    }

    #[test]
    fn test_rejects_gapped_ranks() {
        let mut stats = user_stats();
        stats.top_movies[1].rank = 3;
        assert!(validate_user_stats(&stats).is_err());
    }

    #[test]
    fn test_rejects_bad_percentile_and_binge() {
        let mut stats = user_stats();
        stats.percentile = 101.0;
        assert!(validate_user_stats(&stats).is_err());

        let mut stats = user_stats();
        if let Some(binge) = stats.longest_binge.as_mut() {
            binge.end_time = binge.start_time - 1;
        }
        assert!(validate_user_stats(&stats).is_err());
    }

    #[test]
    fn test_server_checks_subject_ranks() {
        let mut stats = server_stats();
        assert!(validate_server_stats(&stats).is_ok());
        stats.top_subjects[0].rank = 2;
        assert!(validate_server_stats(&stats).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not json"), Err(Error::Json(_))));
        assert!(matches!(decode("{\"statsKind\":\"user\"}"), Err(Error::Json(_))));
    }

    #[test]
    fn test_decode_entry_checks_key() {
        let stats = Stats::User(user_stats());
        let entry = CacheEntry {
            subject_id: Some(1),
            year: 2024,
            stats_kind: StatsKind::User,
            payload_json: encode(&stats).unwrap(),
            calculated_at: Utc::now(),
        };
        assert_eq!(decode_entry(&entry).unwrap(), stats);

        let moved = CacheEntry {
            subject_id: Some(2),
            ..entry
        };
        assert!(matches!(
            decode_entry(&moved),
            Err(Error::SchemaViolation { .. })
        ));
    }
}
