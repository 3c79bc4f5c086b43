//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: playback history
    r#"
    CREATE TABLE IF NOT EXISTS subjects (
        id               INTEGER PRIMARY KEY,
        name             TEXT
    );

    CREATE TABLE IF NOT EXISTS playback_history (
        id                       INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id               INTEGER NOT NULL REFERENCES subjects(id),
        rating_key               TEXT NOT NULL,
        title                    TEXT NOT NULL,
        content_type             TEXT NOT NULL,
        viewed_at                INTEGER NOT NULL,
        duration_seconds         INTEGER,
        grandparent_title        TEXT,
        grandparent_rating_key   TEXT,
        genres                   JSON,
        release_year             INTEGER,
        thumbnail_ref            TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_playback_viewed ON playback_history(viewed_at);
    CREATE INDEX IF NOT EXISTS idx_playback_subject ON playback_history(subject_id, viewed_at);

    CREATE TABLE IF NOT EXISTS show_metadata (
        show_key         TEXT PRIMARY KEY,
        total_episodes   INTEGER NOT NULL
    );
    "#,
    // Version 2: stats cache
    r#"
    -- subject_key mirrors subject_id with -1 for server-wide rows, because
    -- SQLite treats NULLs as distinct in UNIQUE constraints
    CREATE TABLE IF NOT EXISTS stats_cache (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id       INTEGER,
        subject_key      INTEGER NOT NULL,
        year             INTEGER NOT NULL,
        stats_kind       TEXT NOT NULL,
        payload_json     TEXT NOT NULL,
        calculated_at    DATETIME NOT NULL,
        UNIQUE(subject_key, year, stats_kind)
    );

    CREATE INDEX IF NOT EXISTS idx_stats_cache_year ON stats_cache(year);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
