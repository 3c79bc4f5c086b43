//! Year boundaries for stats queries.
//!
//! Every fetch that feeds a calculator is scoped by a [`YearFilter`]; the
//! bounds are inclusive and always computed in UTC.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::types::utc_from_timestamp;

/// Inclusive UTC bounds of a calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearFilter {
    pub year: i32,
    /// Jan 1 00:00:00 UTC (unix seconds)
    pub start_timestamp: i64,
    /// Dec 31 23:59:59 UTC (unix seconds)
    pub end_timestamp: i64,
}

impl YearFilter {
    /// Create the filter for a calendar year.
    pub fn new(year: i32) -> Result<Self> {
        let start = year_start(year)?;
        let next = year_start(year.checked_add(1).ok_or(Error::InvalidYear(year))?)?;
        Ok(Self {
            year,
            start_timestamp: start.timestamp(),
            end_timestamp: next.timestamp() - 1,
        })
    }

    /// Whether a unix timestamp falls inside the year.
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start_timestamp && ts <= self.end_timestamp
    }

    /// Filter for the year before this one.
    pub fn previous(&self) -> Result<Self> {
        Self::new(self.year - 1)
    }

    /// Number of days in the year.
    pub fn days(&self) -> i64 {
        (self.end_timestamp - self.start_timestamp + 1) / 86_400
    }

    pub fn start(&self) -> DateTime<Utc> {
        utc_from_timestamp(self.start_timestamp)
    }

    pub fn end(&self) -> DateTime<Utc> {
        utc_from_timestamp(self.end_timestamp)
    }
}

fn year_start(year: i32) -> Result<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or(Error::InvalidYear(year))
}
