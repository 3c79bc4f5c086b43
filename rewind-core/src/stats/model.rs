//! Aggregate stats returned to presentation layers and stored in the cache.

use serde::{Deserialize, Serialize};

use super::binge::BingeSession;
use super::breakdown::{ContentTypeBreakdown, DecadeBucket};
use super::comparison::YearComparison;
use super::completion::SeriesCompletion;
use super::distribution::Histogram;
use super::marathon::MarathonDay;
use super::ranking::{RankedItem, RewatchItem};
use super::streak::WatchStreak;
use crate::types::{ContentType, StatsKind, SubjectId};

/// Headline totals for a record set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchTotals {
    pub total_plays: u32,
    pub total_watch_minutes: f64,
    /// Distinct rating keys played
    pub unique_titles: u32,
    /// Distinct UTC dates with a play
    pub days_active: u32,
}

impl WatchTotals {
    /// Format watch time for display (e.g., "312h 45m").
    pub fn duration_display(&self) -> String {
        crate::format::format_minutes(self.total_watch_minutes)
    }
}

/// A notable single play (first or last of the year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchMoment {
    pub title: String,
    pub content_type: ContentType,
    pub viewed_at: i64,
}

/// A subject's position on the server leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRanking {
    pub rank: u32,
    pub subject_id: SubjectId,
    /// Display name; rewritten by anonymizing post-processors
    pub name: String,
    pub total_minutes: f64,
}

/// Year in review for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub subject_id: SubjectId,
    pub year: i32,
    pub totals: WatchTotals,
    pub top_movies: Vec<RankedItem>,
    pub top_shows: Vec<RankedItem>,
    pub top_artists: Vec<RankedItem>,
    pub top_genres: Vec<RankedItem>,
    pub top_rewatches: Vec<RewatchItem>,
    pub monthly: Histogram,
    pub hourly: Histogram,
    pub weekday: Histogram,
    pub content_types: ContentTypeBreakdown,
    pub decades: Vec<DecadeBucket>,
    pub longest_binge: Option<BingeSession>,
    /// Sessions with at least two plays
    pub binge_sessions: u32,
    pub marathon_day: Option<MarathonDay>,
    pub watch_streak: Option<WatchStreak>,
    pub first_watch: Option<WatchMoment>,
    pub last_watch: Option<WatchMoment>,
    /// Share of subjects with strictly less watch time (0-100)
    pub percentile: f64,
    pub year_comparison: Option<YearComparison>,
    pub series_completion: Vec<SeriesCompletion>,
}

/// Year in review for the whole server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub year: i32,
    /// Subjects with at least one play in the year
    pub total_subjects: u32,
    pub totals: WatchTotals,
    pub top_subjects: Vec<SubjectRanking>,
    pub top_movies: Vec<RankedItem>,
    pub top_shows: Vec<RankedItem>,
    pub top_artists: Vec<RankedItem>,
    pub top_genres: Vec<RankedItem>,
    pub monthly: Histogram,
    pub hourly: Histogram,
    pub weekday: Histogram,
    pub content_types: ContentTypeBreakdown,
    pub decades: Vec<DecadeBucket>,
    pub marathon_day: Option<MarathonDay>,
    pub year_comparison: Option<YearComparison>,
}

/// Either aggregate, tagged by kind in its JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "statsKind", rename_all = "lowercase")]
pub enum Stats {
    User(UserStats),
    Server(ServerStats),
}

impl Stats {
    pub fn kind(&self) -> StatsKind {
        match self {
            Stats::User(_) => StatsKind::User,
            Stats::Server(_) => StatsKind::Server,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            Stats::User(s) => s.year,
            Stats::Server(s) => s.year,
        }
    }

    /// Subject the stats belong to; None for server-wide stats.
    pub fn subject_id(&self) -> Option<SubjectId> {
        match self {
            Stats::User(s) => Some(s.subject_id),
            Stats::Server(_) => None,
        }
    }

    pub fn totals(&self) -> &WatchTotals {
        match self {
            Stats::User(s) => &s.totals,
            Stats::Server(s) => &s.totals,
        }
    }
}
