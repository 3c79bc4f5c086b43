//! Content-type and release-decade mixes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ContentType, PlaybackRecord};

/// Plays and minutes for one content type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTotals {
    pub count: u32,
    pub minutes: f64,
}

/// Plays and minutes per content type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentTypeBreakdown {
    pub movie: TypeTotals,
    pub episode: TypeTotals,
    pub track: TypeTotals,
}

impl ContentTypeBreakdown {
    pub fn get(&self, content_type: ContentType) -> &TypeTotals {
        match content_type {
            ContentType::Movie => &self.movie,
            ContentType::Episode => &self.episode,
            ContentType::Track => &self.track,
        }
    }

    pub fn total_count(&self) -> u32 {
        self.movie.count + self.episode.count + self.track.count
    }
}

/// Plays of content released in one decade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecadeBucket {
    /// First year of the decade (e.g. 1990)
    pub decade: i32,
    pub count: u32,
    pub minutes: f64,
}

impl DecadeBucket {
    /// Display label (e.g. "1990s").
    pub fn label(&self) -> String {
        format!("{}s", self.decade)
    }
}

pub fn content_types(records: &[PlaybackRecord]) -> ContentTypeBreakdown {
    let mut seconds = [0i64; 3];
    let mut counts = [0u32; 3];
    for record in records {
        let idx = match record.content_type {
            ContentType::Movie => 0,
            ContentType::Episode => 1,
            ContentType::Track => 2,
        };
        seconds[idx] += record.duration_secs();
        counts[idx] += 1;
    }
    let totals = |idx: usize| TypeTotals {
        count: counts[idx],
        minutes: seconds[idx] as f64 / 60.0,
    };
    ContentTypeBreakdown {
        movie: totals(0),
        episode: totals(1),
        track: totals(2),
    }
}

/// Plays by release decade, ascending. Records without a release year are skipped.
pub fn decades(records: &[PlaybackRecord]) -> Vec<DecadeBucket> {
    let mut buckets: BTreeMap<i32, (u32, i64)> = BTreeMap::new();
    for record in records {
        let Some(year) = record.release_year else {
            continue;
        };
        let entry = buckets.entry(year.div_euclid(10) * 10).or_default();
        entry.0 += 1;
        entry.1 += record.duration_secs();
    }
    buckets
        .into_iter()
        .map(|(decade, (count, secs))| DecadeBucket {
            decade,
            count,
            minutes: secs as f64 / 60.0,
        })
        .collect()
}
