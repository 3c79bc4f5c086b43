//! Binge session detection.
//!
//! Plays are swept in chronological order and merged greedily: a play joins
//! the open session when it starts within the gap threshold of the session
//! end, otherwise it opens a new session. The result is deterministic for a
//! given record set; it does not search for the grouping that maximizes
//! total minutes.

use serde::{Deserialize, Serialize};

use crate::types::PlaybackRecord;

/// Maximum gap between plays of one session (30 minutes).
pub const DEFAULT_GAP_SECS: i64 = 1800;

/// A run of plays with short gaps in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BingeSession {
    /// Start of the first play (unix seconds)
    pub start_time: i64,
    /// Session end (unix seconds), never before `start_time`
    pub end_time: i64,
    pub plays: u32,
    pub total_minutes: f64,
}

struct OpenSession {
    start_time: i64,
    end_time: i64,
    plays: u32,
    total_seconds: i64,
}

impl OpenSession {
    fn start(record: &PlaybackRecord) -> Self {
        Self {
            start_time: record.viewed_at,
            end_time: record.viewed_at + record.duration_secs(),
            plays: 1,
            total_seconds: record.duration_secs(),
        }
    }

    fn absorb(&mut self, record: &PlaybackRecord) {
        self.end_time = self.end_time.max(record.viewed_at);
        self.plays += 1;
        self.total_seconds += record.duration_secs();
    }

    fn close(self) -> BingeSession {
        BingeSession {
            start_time: self.start_time,
            end_time: self.end_time,
            plays: self.plays,
            total_minutes: self.total_seconds as f64 / 60.0,
        }
    }
}

/// All sessions, longest (by total minutes) first.
pub fn detect_sessions(records: &[PlaybackRecord], gap_secs: i64) -> Vec<BingeSession> {
    let mut ordered: Vec<&PlaybackRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.viewed_at);

    let mut sessions = Vec::new();
    let mut current: Option<OpenSession> = None;

    for record in ordered {
        match current.as_mut() {
            Some(open) if record.viewed_at - open.end_time <= gap_secs => open.absorb(record),
            _ => {
                if let Some(done) = current.replace(OpenSession::start(record)) {
                    sessions.push(done.close());
                }
            }
        }
    }
    if let Some(done) = current {
        sessions.push(done.close());
    }

    sessions.sort_by(|a, b| b.total_minutes.total_cmp(&a.total_minutes));
    sessions
}

/// The single longest session, None when there are no records.
pub fn detect_longest(records: &[PlaybackRecord], gap_secs: i64) -> Option<BingeSession> {
    detect_sessions(records, gap_secs).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentType;

    fn play(viewed_at: i64, minutes: i64) -> PlaybackRecord {
        PlaybackRecord {
            rating_key: format!("ep-{}", viewed_at),
            title: "Episode".to_string(),
            content_type: ContentType::Episode,
            viewed_at,
            duration_seconds: Some(minutes * 60),
            subject_id: 1,
            grandparent_title: Some("Show".to_string()),
            grandparent_rating_key: None,
            genres: None,
            release_year: None,
            thumbnail_ref: None,
        }
    }

    #[test]
    fn test_merges_close_plays() {
        let records = vec![play(14_000, 90), play(6000, 120), play(0, 90)];
        let sessions = detect_sessions(&records, DEFAULT_GAP_SECS);
        assert_eq!(sessions.len(), 2);

        let longest = &sessions[0];
        assert_eq!(longest.start_time, 0);
        assert_eq!(longest.end_time, 6000);
        assert_eq!(longest.plays, 2);
        assert_eq!(longest.total_minutes, 210.0);

        assert_eq!(sessions[1].start_time, 14_000);
        assert_eq!(sessions[1].plays, 1);

        let best = detect_longest(&records, DEFAULT_GAP_SECS).unwrap();
        assert_eq!(best, sessions[0]);
    }

    #[test]
    fn test_gap_measured_from_session_end_not_last_play_end() {
        // The second play ends at 13200; the third starts 800s later but
        // 8000s after the session end, so it opens a new session.
        let records = vec![play(0, 90), play(6000, 120), play(14_000, 90)];
        let sessions = detect_sessions(&records, DEFAULT_GAP_SECS);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].end_time, 6000);
        assert_eq!(sessions[1].start_time, 14_000);
        assert_eq!(sessions[1].total_minutes, 90.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(detect_sessions(&[], DEFAULT_GAP_SECS).is_empty());
        assert!(detect_longest(&[], DEFAULT_GAP_SECS).is_none());
    }

    #[test]
    fn test_gap_threshold_is_inclusive() {
        // First play ends at 600; second starts exactly 1800s later.
        let records = vec![play(0, 10), play(2400, 10), play(4201, 10)];
        let sessions = detect_sessions(&records, DEFAULT_GAP_SECS);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].plays, 2);
    }

    #[test]
    fn test_null_duration_counts_as_play() {
        let mut silent = play(100, 0);
        silent.duration_seconds = None;
        let sessions = detect_sessions(&[play(0, 1), silent], DEFAULT_GAP_SECS);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].plays, 2);
        assert_eq!(sessions[0].total_minutes, 1.0);
        assert!(sessions[0].end_time >= sessions[0].start_time);
    }

    #[test]
    fn test_custom_gap() {
        let records = vec![play(0, 1), play(600, 1)];
        assert_eq!(detect_sessions(&records, 60).len(), 2);
        assert_eq!(detect_sessions(&records, 600).len(), 1);
    }
}
