//! Longest run of consecutive watch days.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::PlaybackRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStreak {
    /// Number of consecutive days
    pub longest_streak: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Distinct UTC dates with at least one play, ascending.
pub fn active_dates(records: &[PlaybackRecord]) -> BTreeSet<NaiveDate> {
    records
        .iter()
        .map(|r| r.viewed_at_utc().date_naive())
        .collect()
}

/// Longest streak (earliest run on ties), None when there are no records.
pub fn longest_streak(records: &[PlaybackRecord]) -> Option<WatchStreak> {
    let dates = active_dates(records);
    let mut iter = dates.into_iter();
    let first = iter.next()?;

    let mut best = WatchStreak {
        longest_streak: 1,
        start_date: first,
        end_date: first,
    };
    let mut run_start = first;
    let mut run_len = 1u32;
    let mut prev = first;

    for date in iter {
        if (date - prev).num_days() == 1 {
            run_len += 1;
        } else {
            run_start = date;
            run_len = 1;
        }
        if run_len > best.longest_streak {
            best = WatchStreak {
                longest_streak: run_len,
                start_date: run_start,
                end_date: date,
            };
        }
        prev = date;
    }

    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;

    fn play_on(y: i32, m: u32, d: u32) -> PlaybackRecord {
        let ts = NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        PlaybackRecord {
            rating_key: "1".to_string(),
            title: "Heat".to_string(),
            content_type: ContentType::Movie,
            viewed_at: ts,
            duration_seconds: Some(60),
            subject_id: 1,
            grandparent_title: None,
            grandparent_rating_key: None,
            genres: None,
            release_year: None,
            thumbnail_ref: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_longest_run() {
        let records = vec![
            play_on(2024, 3, 1),
            play_on(2024, 3, 2),
            play_on(2024, 3, 2),
            play_on(2024, 3, 10),
            play_on(2024, 3, 11),
            play_on(2024, 3, 12),
            play_on(2024, 3, 20),
        ];
        let streak = longest_streak(&records).unwrap();
        assert_eq!(streak.longest_streak, 3);
        assert_eq!(streak.start_date, date(2024, 3, 10));
        assert_eq!(streak.end_date, date(2024, 3, 12));
    }

    #[test]
    fn test_single_day() {
        let streak = longest_streak(&[play_on(2024, 6, 1)]).unwrap();
        assert_eq!(streak.longest_streak, 1);
        assert_eq!(streak.start_date, streak.end_date);
    }

    #[test]
    fn test_ties_keep_earliest_run() {
        let records = vec![
            play_on(2024, 1, 1),
            play_on(2024, 1, 2),
            play_on(2024, 2, 1),
            play_on(2024, 2, 2),
        ];
        let streak = longest_streak(&records).unwrap();
        assert_eq!(streak.start_date, date(2024, 1, 1));
    }

    #[test]
    fn test_streak_across_leap_day() {
        let records = vec![play_on(2024, 2, 28), play_on(2024, 2, 29), play_on(2024, 3, 1)];
        assert_eq!(longest_streak(&records).unwrap().longest_streak, 3);

        // 2023 has no Feb 29, so Feb 28 -> Mar 1 is consecutive
        let records = vec![play_on(2023, 2, 28), play_on(2023, 3, 1)];
        assert_eq!(longest_streak(&records).unwrap().longest_streak, 2);
    }

    #[test]
    fn test_streak_across_year_boundary() {
        let records = vec![play_on(2023, 12, 30), play_on(2023, 12, 31), play_on(2024, 1, 1)];
        let streak = longest_streak(&records).unwrap();
        assert_eq!(streak.longest_streak, 3);
        assert_eq!(streak.end_date, date(2024, 1, 1));
    }

    #[test]
    fn test_empty() {
        assert!(longest_streak(&[]).is_none());
    }
}
