//! Series completion: watched episodes against the show's episode count.
//!
//! The episode count comes from the media server. When it is unknown the
//! completion is estimated from the watched count alone, and the result says
//! so through [`CompletionSource::Estimated`].

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{ContentType, PlaybackRecord, ShowMetadata};

/// Where the episode total came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionSource {
    /// Episode total reported by the media server
    Metadata,
    /// Episode total unknown; watched count used as the total
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesCompletion {
    pub show_title: String,
    pub show_key: Option<String>,
    pub watched_episodes: u32,
    pub total_episodes: u32,
    /// 0-100, one decimal
    pub percent: f64,
    pub source: CompletionSource,
}

/// Completion that could not be confirmed against show metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialData {
    pub estimate: SeriesCompletion,
}

/// Outcome of the show metadata lookup for one computation.
#[derive(Debug, Clone, Copy)]
pub enum ShowMetadataLookup<'a> {
    /// Lookup answered; shows missing from the map are estimated
    Available(&'a HashMap<String, ShowMetadata>),
    /// Lookup failed; every show is estimated
    Unavailable,
    /// No episodes with show keys, so nothing was asked
    NotRequested,
}

impl<'a> ShowMetadataLookup<'a> {
    pub fn available(&self) -> Option<&'a HashMap<String, ShowMetadata>> {
        match self {
            ShowMetadataLookup::Available(map) => Some(*map),
            _ => None,
        }
    }
}

/// Locally observed progress through one show.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowProgress {
    pub show_title: String,
    pub show_key: Option<String>,
    /// Distinct episodes watched
    pub watched_episodes: u32,
}

/// Group episode plays by show, counting distinct episodes.
///
/// Sorted by watched episodes descending, then show title.
pub fn show_progress(records: &[PlaybackRecord]) -> Vec<ShowProgress> {
    let mut shows: HashMap<&str, (&PlaybackRecord, HashSet<&str>)> = HashMap::new();
    for record in records.iter().filter(|r| r.content_type == ContentType::Episode) {
        let key = record
            .grandparent_rating_key
            .as_deref()
            .unwrap_or_else(|| record.show_title());
        shows
            .entry(key)
            .or_insert_with(|| (record, HashSet::new()))
            .1
            .insert(record.rating_key.as_str());
    }

    let mut progress: Vec<ShowProgress> = shows
        .into_values()
        .map(|(first, episodes)| ShowProgress {
            show_title: first.show_title().to_string(),
            show_key: first.grandparent_rating_key.clone(),
            watched_episodes: episodes.len() as u32,
        })
        .collect();
    progress.sort_by(|a, b| {
        b.watched_episodes
            .cmp(&a.watched_episodes)
            .then_with(|| super::ranking::compare_keys(&a.show_title, &b.show_title))
            .then_with(|| a.show_key.cmp(&b.show_key))
    });
    progress
}

/// Show keys worth looking up, in progress order.
pub fn show_keys(progress: &[ShowProgress], limit: usize) -> Vec<String> {
    progress
        .iter()
        .take(limit)
        .filter_map(|p| p.show_key.clone())
        .collect()
}

/// Merge observed progress with external metadata.
pub fn merge_completion(
    progress: &ShowProgress,
    metadata: Option<&ShowMetadata>,
) -> Result<SeriesCompletion, PartialData> {
    match metadata {
        Some(meta) if meta.total_episodes > 0 => {
            // A show can gain watched specials beyond the listed total.
            let total = meta.total_episodes.max(progress.watched_episodes);
            Ok(completion(progress, total, CompletionSource::Metadata))
        }
        _ => Err(PartialData {
            estimate: completion(
                progress,
                progress.watched_episodes,
                CompletionSource::Estimated,
            ),
        }),
    }
}

fn completion(progress: &ShowProgress, total: u32, source: CompletionSource) -> SeriesCompletion {
    let percent = if total == 0 {
        0.0
    } else {
        (progress.watched_episodes as f64 / total as f64 * 1000.0).round() / 10.0
    };
    SeriesCompletion {
        show_title: progress.show_title.clone(),
        show_key: progress.show_key.clone(),
        watched_episodes: progress.watched_episodes,
        total_episodes: total,
        percent,
        source,
    }
}

/// Completion for the top `limit` shows.
///
/// `metadata` is `None` when the lookup failed; every show is then estimated.
pub fn series_completion(
    progress: &[ShowProgress],
    metadata: Option<&HashMap<String, ShowMetadata>>,
    limit: usize,
) -> Vec<SeriesCompletion> {
    progress
        .iter()
        .take(limit)
        .map(|show| {
            let meta = show
                .show_key
                .as_ref()
                .and_then(|key| metadata.and_then(|m| m.get(key)));
            merge_completion(show, meta).unwrap_or_else(|partial| partial.estimate)
        })
        .collect()
}
