//! Monthly, hourly and weekday histograms.
//!
//! A play lands entirely in the bucket of its start time (UTC), even when
//! playback runs past the bucket boundary.

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::PlaybackRecord;

pub const MONTH_BUCKETS: usize = 12;
pub const HOUR_BUCKETS: usize = 24;
pub const WEEKDAY_BUCKETS: usize = 7;

/// Minutes and plays per bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub minutes: Vec<f64>,
    pub plays: Vec<u32>,
}

impl Histogram {
    /// Zeroed histogram with `len` buckets.
    pub fn zeroed(len: usize) -> Self {
        Self {
            minutes: vec![0.0; len],
            plays: vec![0; len],
        }
    }

    /// Build a histogram by routing each record to a bucket index.
    pub fn from_records<F>(records: &[PlaybackRecord], len: usize, bucket: F) -> Self
    where
        F: Fn(&PlaybackRecord) -> usize,
    {
        let mut seconds = vec![0i64; len];
        let mut plays = vec![0u32; len];
        for record in records {
            let idx = bucket(record);
            seconds[idx] += record.duration_secs();
            plays[idx] += 1;
        }
        Self {
            minutes: seconds.into_iter().map(|s| s as f64 / 60.0).collect(),
            plays,
        }
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn total_minutes(&self) -> f64 {
        self.minutes.iter().sum()
    }

    pub fn total_plays(&self) -> u32 {
        self.plays.iter().sum()
    }

    /// Bucket with the most plays (earliest on ties), None when empty.
    pub fn peak_bucket(&self) -> Option<usize> {
        self.plays
            .iter()
            .enumerate()
            .filter(|(_, &plays)| plays > 0)
            .fold(None, |best: Option<(usize, u32)>, (i, &plays)| match best {
                Some((_, best_plays)) if best_plays >= plays => best,
                _ => Some((i, plays)),
            })
            .map(|(i, _)| i)
    }
}

/// Plays by UTC month (0 = January).
pub fn monthly(records: &[PlaybackRecord]) -> Histogram {
    Histogram::from_records(records, MONTH_BUCKETS, |r| r.viewed_at_utc().month0() as usize)
}

/// Plays by UTC hour of day.
pub fn hourly(records: &[PlaybackRecord]) -> Histogram {
    Histogram::from_records(records, HOUR_BUCKETS, |r| r.viewed_at_utc().hour() as usize)
}

/// Plays by UTC day of week (0 = Sunday).
pub fn weekday(records: &[PlaybackRecord]) -> Histogram {
    Histogram::from_records(records, WEEKDAY_BUCKETS, |r| {
        r.viewed_at_utc().weekday().num_days_from_sunday() as usize
    })
}
