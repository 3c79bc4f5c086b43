//! Database repository layer
//!
//! Provides insert operations for playback history and implements
//! [`RecordSource`] and [`StatsCache`] on top of SQLite.

use crate::cache::{CacheEntry, CacheKey, InvalidationFilter, StatsCache};
use crate::error::{Error, Result};
use crate::source::RecordSource;
use crate::stats::YearFilter;
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Subject key stored for server-wide cache rows.
const SERVER_SUBJECT_KEY: i64 = -1;

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        super::schema::run_migrations(&conn)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============================================
    // Subject operations
    // ============================================

    /// Insert or update a subject's display name
    pub fn upsert_subject(&self, id: SubjectId, name: Option<&str>) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO subjects (id, name) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                name = COALESCE(excluded.name, subjects.name)
            "#,
            params![id, name],
        )?;
        Ok(())
    }

    // ============================================
    // Playback operations
    // ============================================

    /// Insert a single play, creating its subject if needed
    pub fn insert_playback(&self, record: &PlaybackRecord) -> Result<i64> {
        let conn = self.conn();
        Self::insert_playback_with(&conn, record)
    }

    /// Insert plays in one transaction, returning how many were written
    pub fn insert_playbacks(&self, records: &[PlaybackRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for record in records {
            Self::insert_playback_with(&tx, record)?;
        }
        tx.commit()?;
        tracing::debug!(count = records.len(), "Inserted playback records");
        Ok(records.len())
    }

    fn insert_playback_with(conn: &Connection, record: &PlaybackRecord) -> Result<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO subjects (id) VALUES (?1)",
            [record.subject_id],
        )?;
        let genres = record
            .genres
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            r#"
            INSERT INTO playback_history (
                subject_id, rating_key, title, content_type, viewed_at,
                duration_seconds, grandparent_title, grandparent_rating_key,
                genres, release_year, thumbnail_ref
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                record.subject_id,
                record.rating_key,
                record.title,
                record.content_type.as_str(),
                record.viewed_at,
                record.duration_seconds,
                record.grandparent_title,
                record.grandparent_rating_key,
                genres,
                record.release_year,
                record.thumbnail_ref,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Count stored plays
    pub fn count_playbacks(&self) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM playback_history", [], |r| r.get(0))?;
        Ok(count)
    }

    fn row_to_playback(row: &Row) -> rusqlite::Result<PlaybackRecord> {
        let content_type: String = row.get("content_type")?;
        let genres: Option<String> = row.get("genres")?;

        Ok(PlaybackRecord {
            rating_key: row.get("rating_key")?,
            title: row.get("title")?,
            content_type: content_type
                .parse()
                .map_err(|e: String| conversion_error(e))?,
            viewed_at: row.get("viewed_at")?,
            duration_seconds: row.get("duration_seconds")?,
            subject_id: row.get("subject_id")?,
            grandparent_title: row.get("grandparent_title")?,
            grandparent_rating_key: row.get("grandparent_rating_key")?,
            genres: genres
                .map(|g| serde_json::from_str(&g))
                .transpose()
                .map_err(conversion_error)?,
            release_year: row.get("release_year")?,
            thumbnail_ref: row.get("thumbnail_ref")?,
        })
    }

    // ============================================
    // Show metadata operations
    // ============================================

    /// Insert or update a show's episode count
    pub fn upsert_show_metadata(&self, show_key: &str, total_episodes: u32) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO show_metadata (show_key, total_episodes) VALUES (?1, ?2)
            ON CONFLICT(show_key) DO UPDATE SET
                total_episodes = excluded.total_episodes
            "#,
            params![show_key, total_episodes],
        )?;
        Ok(())
    }

    // ============================================
    // Stats cache operations
    // ============================================

    fn row_to_cache_entry(row: &Row) -> rusqlite::Result<CacheEntry> {
        let stats_kind: String = row.get("stats_kind")?;
        let calculated_at: String = row.get("calculated_at")?;

        Ok(CacheEntry {
            subject_id: row.get("subject_id")?,
            year: row.get("year")?,
            stats_kind: stats_kind
                .parse()
                .map_err(|e: String| conversion_error(e))?,
            payload_json: row.get("payload_json")?,
            calculated_at: DateTime::parse_from_rfc3339(&calculated_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(conversion_error)?,
        })
    }
}

fn conversion_error(
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, err.into())
}

/// Non-null stand-in for `subject_id` in the unique index. A user id equal to
/// the server sentinel never collides with server rows because `stats_kind`
/// is part of the key and invalidation filters on `subject_id`.
fn subject_key(subject_id: Option<SubjectId>) -> i64 {
    subject_id.unwrap_or(SERVER_SUBJECT_KEY)
}

impl RecordSource for Database {
    fn fetch_records(
        &self,
        subject: Option<SubjectId>,
        filter: &YearFilter,
    ) -> Result<Vec<PlaybackRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM playback_history
            WHERE viewed_at BETWEEN ?1 AND ?2
              AND (?3 IS NULL OR subject_id = ?3)
            ORDER BY viewed_at, id
            "#,
        )?;
        let records = stmt
            .query_map(
                params![filter.start_timestamp, filter.end_timestamp, subject],
                Self::row_to_playback,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn fetch_population_totals(&self, filter: &YearFilter) -> Result<Vec<SubjectTotal>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT p.subject_id, s.name,
                   SUM(MAX(COALESCE(p.duration_seconds, 0), 0)) AS total_seconds
            FROM playback_history p
            LEFT JOIN subjects s ON s.id = p.subject_id
            WHERE p.viewed_at BETWEEN ?1 AND ?2
            GROUP BY p.subject_id
            ORDER BY p.subject_id
            "#,
        )?;
        let totals = stmt
            .query_map(params![filter.start_timestamp, filter.end_timestamp], |row| {
                let seconds: i64 = row.get("total_seconds")?;
                Ok(SubjectTotal {
                    subject_id: row.get("subject_id")?,
                    name: row.get("name")?,
                    total_minutes: seconds as f64 / 60.0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(totals)
    }

    fn fetch_show_metadata(&self, show_keys: &[String]) -> Result<HashMap<String, ShowMetadata>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT total_episodes FROM show_metadata WHERE show_key = ?1")?;
        let mut found = HashMap::new();
        for key in show_keys {
            let total: Option<u32> = stmt
                .query_row([key], |row| row.get(0))
                .optional()?;
            if let Some(total_episodes) = total {
                found.insert(key.clone(), ShowMetadata { total_episodes });
            }
        }
        Ok(found)
    }
}

impl StatsCache for Database {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.conn();
        conn.query_row(
            r#"
            SELECT subject_id, year, stats_kind, payload_json, calculated_at
            FROM stats_cache
            WHERE subject_key = ?1 AND year = ?2 AND stats_kind = ?3
            "#,
            params![subject_key(key.subject_id), key.year, key.kind.as_str()],
            Self::row_to_cache_entry,
        )
        .optional()
        .map_err(Error::from)
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO stats_cache (
                subject_id, subject_key, year, stats_kind, payload_json, calculated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(subject_key, year, stats_kind) DO UPDATE SET
                subject_id = excluded.subject_id,
                payload_json = excluded.payload_json,
                calculated_at = excluded.calculated_at
            "#,
            params![
                entry.subject_id,
                subject_key(entry.subject_id),
                entry.year,
                entry.stats_kind.as_str(),
                entry.payload_json,
                entry.calculated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn invalidate(&self, filter: &InvalidationFilter) -> Result<usize> {
        let conn = self.conn();
        let removed = conn.execute(
            r#"
            DELETE FROM stats_cache
            WHERE (?1 IS NULL OR subject_id = ?1)
              AND (?2 IS NULL OR year = ?2)
            "#,
            params![filter.subject_id, filter.year],
        )?;
        Ok(removed)
    }
}
