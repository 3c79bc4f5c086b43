//! Assemble calculator outputs into [`UserStats`] and [`ServerStats`].
//!
//! Assembly is pure: all I/O (record fetches, metadata lookups) happens in the
//! service before these functions are called.

use std::collections::{HashMap, HashSet};

use super::completion::{self, ShowMetadataLookup};
use super::model::{ServerStats, SubjectRanking, UserStats, WatchMoment, WatchTotals};
use super::period::YearFilter;
use super::{binge, breakdown, comparison, distribution, marathon, percentile, ranking, streak};
use crate::config::StatsConfig;
use crate::types::{PlaybackRecord, SubjectId, SubjectTotal};

/// Inputs for one subject's year in review.
pub struct UserInputs<'a> {
    pub subject_id: SubjectId,
    pub filter: &'a YearFilter,
    /// The subject's plays in the year
    pub records: &'a [PlaybackRecord],
    /// The subject's total minutes in the previous year
    pub previous_minutes: f64,
    /// Per-subject totals for the year, including this subject
    pub population: &'a [SubjectTotal],
    pub show_metadata: ShowMetadataLookup<'a>,
}

/// Inputs for the server-wide year in review.
pub struct ServerInputs<'a> {
    pub filter: &'a YearFilter,
    /// Every subject's plays in the year
    pub records: &'a [PlaybackRecord],
    /// Server total minutes in the previous year
    pub previous_minutes: f64,
    pub population: &'a [SubjectTotal],
}

/// Totals over a record set.
pub fn watch_totals(records: &[PlaybackRecord]) -> WatchTotals {
    let total_seconds: i64 = records.iter().map(|r| r.duration_secs()).sum();
    let unique_titles: HashSet<&str> = records.iter().map(|r| r.rating_key.as_str()).collect();
    WatchTotals {
        total_plays: records.len() as u32,
        total_watch_minutes: total_seconds as f64 / 60.0,
        unique_titles: unique_titles.len() as u32,
        days_active: streak::active_dates(records).len() as u32,
    }
}

/// Sum of watch minutes over a record set.
pub fn total_minutes(records: &[PlaybackRecord]) -> f64 {
    records.iter().map(|r| r.duration_secs()).sum::<i64>() as f64 / 60.0
}

fn moment(record: &PlaybackRecord) -> WatchMoment {
    WatchMoment {
        title: record.title.clone(),
        content_type: record.content_type,
        viewed_at: record.viewed_at,
    }
}

/// First and last play by start time.
pub fn first_and_last(records: &[PlaybackRecord]) -> (Option<WatchMoment>, Option<WatchMoment>) {
    let first = records.iter().min_by_key(|r| r.viewed_at).map(moment);
    // max_by_key returns the last maximum, which keeps ties in input order
    let last = records.iter().max_by_key(|r| r.viewed_at).map(moment);
    (first, last)
}

/// Rank subjects by total minutes (name breaks ties).
pub fn rank_subjects(population: &[SubjectTotal], limit: usize) -> Vec<SubjectRanking> {
    let mut named: Vec<(String, &SubjectTotal)> = population
        .iter()
        .filter(|s| s.total_minutes > 0.0)
        .map(|s| (subject_name(s), s))
        .collect();
    named.sort_by(|(a_name, a), (b_name, b)| {
        b.total_minutes
            .total_cmp(&a.total_minutes)
            .then_with(|| ranking::compare_keys(a_name, b_name))
            .then_with(|| a.subject_id.cmp(&b.subject_id))
    });
    named
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (name, s))| SubjectRanking {
            rank: (i + 1) as u32,
            subject_id: s.subject_id,
            name,
            total_minutes: s.total_minutes,
        })
        .collect()
}

fn subject_name(total: &SubjectTotal) -> String {
    total
        .name
        .clone()
        .unwrap_or_else(|| format!("User {}", total.subject_id))
}

pub fn user_stats(inputs: &UserInputs<'_>, config: &StatsConfig) -> UserStats {
    let records = inputs.records;
    let limit = config.top_limit;
    let totals = watch_totals(records);

    let sessions = binge::detect_sessions(records, config.binge_gap_secs);
    let binge_sessions = sessions.iter().filter(|s| s.plays >= 2).count() as u32;
    let longest_binge = sessions.into_iter().next();

    let population: Vec<f64> = inputs.population.iter().map(|s| s.total_minutes).collect();
    let (first_watch, last_watch) = first_and_last(records);

    let progress = completion::show_progress(records);
    let series_completion = completion::series_completion(
        &progress,
        inputs.show_metadata.available(),
        limit,
    );

    UserStats {
        subject_id: inputs.subject_id,
        year: inputs.filter.year,
        top_movies: ranking::top_movies(records, limit),
        top_shows: ranking::top_shows(records, limit),
        top_artists: ranking::top_artists(records, limit),
        top_genres: ranking::top_genres(records, limit),
        top_rewatches: ranking::top_rewatches(records, limit),
        monthly: distribution::monthly(records),
        hourly: distribution::hourly(records),
        weekday: distribution::weekday(records),
        content_types: breakdown::content_types(records),
        decades: breakdown::decades(records),
        longest_binge,
        binge_sessions,
        marathon_day: marathon::marathon_day(records, config.marathon_sample_size),
        watch_streak: streak::longest_streak(records),
        first_watch,
        last_watch,
        percentile: percentile::percentile(totals.total_watch_minutes, &population),
        year_comparison: comparison::compare_years(
            totals.total_watch_minutes,
            inputs.previous_minutes,
            inputs.filter.year - 1,
        ),
        series_completion,
        totals,
    }
}

pub fn server_stats(inputs: &ServerInputs<'_>, config: &StatsConfig) -> ServerStats {
    let records = inputs.records;
    let limit = config.top_limit;
    let totals = watch_totals(records);

    let mut subjects: HashSet<SubjectId> = records.iter().map(|r| r.subject_id).collect();
    subjects.extend(
        inputs
            .population
            .iter()
            .filter(|s| s.total_minutes > 0.0)
            .map(|s| s.subject_id),
    );

    ServerStats {
        year: inputs.filter.year,
        total_subjects: subjects.len() as u32,
        top_subjects: rank_subjects(inputs.population, limit),
        top_movies: ranking::top_movies(records, limit),
        top_shows: ranking::top_shows(records, limit),
        top_artists: ranking::top_artists(records, limit),
        top_genres: ranking::top_genres(records, limit),
        monthly: distribution::monthly(records),
        hourly: distribution::hourly(records),
        weekday: distribution::weekday(records),
        content_types: breakdown::content_types(records),
        decades: breakdown::decades(records),
        marathon_day: marathon::marathon_day(records, config.marathon_sample_size),
        year_comparison: comparison::compare_years(
            totals.total_watch_minutes,
            inputs.previous_minutes,
            inputs.filter.year - 1,
        ),
        totals,
    }
}

/// Population totals computed from a record set, for sources without an aggregate query.
pub fn population_from_records(records: &[PlaybackRecord]) -> Vec<SubjectTotal> {
    let mut seconds: HashMap<SubjectId, i64> = HashMap::new();
    for record in records {
        *seconds.entry(record.subject_id).or_insert(0) += record.duration_secs();
    }
    let mut totals: Vec<SubjectTotal> = seconds
        .into_iter()
        .map(|(subject_id, secs)| SubjectTotal {
            subject_id,
            name: None,
            total_minutes: secs as f64 / 60.0,
        })
        .collect();
    totals.sort_by_key(|t| t.subject_id);
    totals
}
