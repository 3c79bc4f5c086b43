//! Top-N rankings by play count.
//!
//! All rankings share one grouping routine: count plays per key, keep the
//! first thumbnail seen for the key, sort by count descending and break ties
//! on the key so the output is deterministic.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ContentType, PlaybackRecord};

/// Default number of entries in a ranked list.
pub const DEFAULT_LIMIT: usize = 10;

/// One entry of a ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    /// 1-based position in the list
    pub rank: u32,
    pub title: String,
    /// Number of plays
    pub count: u32,
    pub thumbnail_ref: Option<String>,
}

/// A title played more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewatchItem {
    pub rank: u32,
    pub rating_key: String,
    pub title: String,
    pub count: u32,
    pub thumbnail_ref: Option<String>,
}

/// Compare grouping keys for tie-breaks.
///
/// Case-insensitive first so "alien" and "Alien" sort next to each other,
/// then by bytes so distinct keys never compare equal.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[derive(Default)]
struct Group<'a> {
    count: u32,
    thumbnail: Option<&'a str>,
}

/// Rank `(key, thumbnail)` pairs by how often each key occurs.
pub fn rank_keys<'a, I>(items: I, limit: usize) -> Vec<RankedItem>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut groups: HashMap<&'a str, Group<'a>> = HashMap::new();
    for (key, thumbnail) in items {
        let group = groups.entry(key).or_default();
        group.count += 1;
        if group.thumbnail.is_none() {
            group.thumbnail = thumbnail;
        }
    }

    let mut sorted: Vec<(&str, Group)> = groups.into_iter().collect();
    sorted.sort_by(|(a_key, a), (b_key, b)| {
        b.count.cmp(&a.count).then_with(|| compare_keys(a_key, b_key))
    });

    sorted
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (key, group))| RankedItem {
            rank: (i + 1) as u32,
            title: key.to_string(),
            count: group.count,
            thumbnail_ref: group.thumbnail.map(String::from),
        })
        .collect()
}

/// Most-played movies, grouped by title.
pub fn top_movies(records: &[PlaybackRecord], limit: usize) -> Vec<RankedItem> {
    rank_keys(
        records
            .iter()
            .filter(|r| r.content_type == ContentType::Movie)
            .map(|r| (r.title.as_str(), r.thumbnail_ref.as_deref())),
        limit,
    )
}

/// Most-played shows, grouped by show title (falling back to episode title).
pub fn top_shows(records: &[PlaybackRecord], limit: usize) -> Vec<RankedItem> {
    rank_keys(
        records
            .iter()
            .filter(|r| r.content_type == ContentType::Episode)
            .map(|r| (r.show_title(), r.thumbnail_ref.as_deref())),
        limit,
    )
}

/// Most-played artists, grouped by track grandparent (falling back to track title).
pub fn top_artists(records: &[PlaybackRecord], limit: usize) -> Vec<RankedItem> {
    rank_keys(
        records
            .iter()
            .filter(|r| r.content_type == ContentType::Track)
            .map(|r| (r.show_title(), r.thumbnail_ref.as_deref())),
        limit,
    )
}

/// Most-played genres. A record counts once toward every genre it lists.
pub fn top_genres(records: &[PlaybackRecord], limit: usize) -> Vec<RankedItem> {
    rank_keys(
        records
            .iter()
            .filter_map(|r| r.genres.as_ref())
            .flatten()
            .map(|genre| (genre.as_str(), None)),
        limit,
    )
}

/// Content played at least twice, grouped by rating key.
pub fn top_rewatches(records: &[PlaybackRecord], limit: usize) -> Vec<RewatchItem> {
    let mut groups: HashMap<&str, (u32, &PlaybackRecord, Option<&str>)> = HashMap::new();
    for record in records {
        let entry = groups
            .entry(record.rating_key.as_str())
            .or_insert((0, record, None));
        entry.0 += 1;
        if entry.2.is_none() {
            entry.2 = record.thumbnail_ref.as_deref();
        }
    }

    let mut rewatched: Vec<_> = groups
        .into_iter()
        .filter(|(_, (count, _, _))| *count >= 2)
        .collect();
    rewatched.sort_by(|(a_key, (a_count, a, _)), (b_key, (b_count, b, _))| {
        b_count
            .cmp(a_count)
            .then_with(|| compare_keys(&a.title, &b.title))
            .then_with(|| a_key.cmp(b_key))
    });

    rewatched
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (key, (count, record, thumbnail)))| RewatchItem {
            rank: (i + 1) as u32,
            rating_key: key.to_string(),
            title: record.title.clone(),
            count,
            thumbnail_ref: thumbnail.map(String::from),
        })
        .collect()
}
