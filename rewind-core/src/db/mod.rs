//! Database layer for rewind
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Playback history, subjects and show metadata
//! - The persisted stats cache

pub mod repo;
pub mod schema;

pub use repo::Database;
