//! # rewind-core
//!
//! Core library for rewind - a year-in-review statistics engine for media
//! server playback history.
//!
//! This library provides:
//! - Domain types for plays, subjects and show metadata
//! - Pure statistics calculators and their assembled aggregates
//! - A cached stats service with per-key single-flight computation
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Source:** playback history behind [`RecordSource`]
//! - **Calculators:** pure functions over a year of [`PlaybackRecord`]s ([`stats`])
//! - **Cache:** validated JSON aggregates behind [`StatsCache`] (regenerable)
//!
//! ## Example
//!
//! ```rust,no_run
//! use rewind_core::{Config, Database, StatsOptions, StatsService};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Arc::new(Database::open(&Config::database_path()).expect("failed to open database"));
//! db.migrate().expect("failed to run migrations");
//!
//! let service = StatsService::new(db.clone(), db, config.stats);
//! let stats = service
//!     .get_user_stats(1, 2024, &StatsOptions::default())
//!     .expect("failed to compute stats");
//! println!("{} plays", stats.totals.total_plays);
//! ```

// Re-export commonly used items at the crate root
pub use cache::{CacheEntry, CacheKey, InvalidationFilter, MemoryStatsCache, StatsCache};
pub use config::{Config, LoggingConfig, StatsConfig};
pub use db::Database;
pub use error::{Error, Result};
pub use service::{StatsOptions, StatsPostProcessor, StatsService};
pub use source::{MemoryRecordSource, RecordSource};
pub use stats::{ServerStats, Stats, UserStats, YearFilter};
pub use types::*;

// Public modules
pub mod cache;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod service;
pub mod source;
pub mod stats;
pub mod types;
