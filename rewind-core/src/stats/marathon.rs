//! Marathon day: the calendar day with the most watch time.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{ContentType, PlaybackRecord};

/// Number of sample plays kept for display.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// A play shown on the marathon-day card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarathonItem {
    pub title: String,
    pub content_type: ContentType,
    pub viewed_at: i64,
    pub thumbnail_ref: Option<String>,
}

/// The day with the most minutes watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarathonDay {
    /// UTC calendar date
    pub date: NaiveDate,
    pub total_minutes: f64,
    pub plays: u32,
    /// Up to `sample_size` plays from that day, in order watched
    pub items: Vec<MarathonItem>,
}

/// Find the marathon day. Ties go to the earliest date.
pub fn marathon_day(records: &[PlaybackRecord], sample_size: usize) -> Option<MarathonDay> {
    let mut days: BTreeMap<NaiveDate, (i64, Vec<&PlaybackRecord>)> = BTreeMap::new();
    for record in records {
        let entry = days.entry(record.viewed_at_utc().date_naive()).or_default();
        entry.0 += record.duration_secs();
        entry.1.push(record);
    }

    // BTreeMap iterates dates ascending; keep the first maximum.
    let (date, (seconds, mut plays)) = days.into_iter().fold(None, |best, day| match best {
        Some((_, (best_secs, _))) if best_secs >= (day.1).0 => best,
        _ => Some(day),
    })?;

    plays.sort_by_key(|r| r.viewed_at);
    let count = plays.len() as u32;
    let items = plays
        .into_iter()
        .take(sample_size)
        .map(|r| MarathonItem {
            title: r.title.clone(),
            content_type: r.content_type,
            viewed_at: r.viewed_at,
            thumbnail_ref: r.thumbnail_ref.clone(),
        })
        .collect();

    Some(MarathonDay {
        date,
        total_minutes: seconds as f64 / 60.0,
        plays: count,
        items,
    })
}
