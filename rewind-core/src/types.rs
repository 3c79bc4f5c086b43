//! Core domain types for rewind
//!
//! These types describe the playback history supplied by the media server
//! and the identities that statistics are computed for.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Subject** | The person whose history is aggregated; server-wide stats have no subject |
//! | **Play** | One [`PlaybackRecord`]: a single viewing or listening event |
//! | **Show** | The grandparent of an episode (series); for tracks the grandparent is the artist |
//! | **Rating key** | The media server's stable identifier for one piece of content |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media server user identifier.
pub type SubjectId = i64;

// ============================================
// Playback records
// ============================================

/// Kind of media a play refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Episode,
    Track,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Episode => "episode",
            ContentType::Track => "track",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentType::Movie),
            "episode" => Ok(ContentType::Episode),
            "track" => Ok(ContentType::Track),
            _ => Err(format!("unknown content type: {}", s)),
        }
    }
}

/// A single play from the media server history.
///
/// Records are immutable inputs to every calculator. A missing duration counts
/// as zero seconds of watch time but still counts as one play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRecord {
    /// Content identifier on the media server
    pub rating_key: String,
    /// Movie, episode or track title
    pub title: String,
    pub content_type: ContentType,
    /// Start of playback (unix seconds, UTC)
    pub viewed_at: i64,
    /// Watched duration in seconds, if known
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    pub subject_id: SubjectId,
    /// Show title for episodes, artist for tracks
    #[serde(default)]
    pub grandparent_title: Option<String>,
    /// Show identifier for episodes, used to look up series metadata
    #[serde(default)]
    pub grandparent_rating_key: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub thumbnail_ref: Option<String>,
}

impl PlaybackRecord {
    /// Watched duration in seconds, treating unknown as zero.
    pub fn duration_secs(&self) -> i64 {
        self.duration_seconds.unwrap_or(0).max(0)
    }

    /// Watched duration in minutes.
    pub fn minutes(&self) -> f64 {
        self.duration_secs() as f64 / 60.0
    }

    /// Playback start as a UTC datetime.
    pub fn viewed_at_utc(&self) -> DateTime<Utc> {
        utc_from_timestamp(self.viewed_at)
    }

    /// Show title for grouping: grandparent title, falling back to the title.
    pub fn show_title(&self) -> &str {
        self.grandparent_title.as_deref().unwrap_or(&self.title)
    }
}

/// Convert unix seconds to a UTC datetime.
///
/// Values chrono cannot represent map to the epoch. Calculators only see
/// records inside a [`YearFilter`](crate::stats::YearFilter), whose bounds come
/// from valid chrono dates, so the fallback never applies to a counted play.
pub fn utc_from_timestamp(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

// ============================================
// Population and metadata
// ============================================

/// Total watch time for one subject over a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTotal {
    pub subject_id: SubjectId,
    /// Display name, if the source knows one
    pub name: Option<String>,
    pub total_minutes: f64,
}

/// Series metadata supplied by the media server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowMetadata {
    pub total_episodes: u32,
}

// ============================================
// Stats kinds
// ============================================

/// Which aggregate a cache row or payload holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsKind {
    /// Per-subject stats
    User,
    /// Server-wide stats
    Server,
}

impl StatsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsKind::User => "user",
            StatsKind::Server => "server",
        }
    }
}

impl std::fmt::Display for StatsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatsKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(StatsKind::User),
            "server" => Ok(StatsKind::Server),
            _ => Err(format!("unknown stats kind: {}", s)),
        }
    }
}
