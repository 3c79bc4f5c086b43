//! Statistics engine for rewind
//!
//! Provides the year-in-review calculators and the aggregates they feed:
//! - Year boundaries ([`period`])
//! - Rankings, histograms, percentile, binge sessions
//! - Derived stats: content/decade mix, marathon day, streaks, year-over-year
//!   comparison, series completion
//! - Assembly into [`UserStats`] / [`ServerStats`]
//!
//! Every calculator is a pure function over a slice of [`PlaybackRecord`]s
//! and treats an empty slice as a valid input.
//!
//! [`PlaybackRecord`]: crate::types::PlaybackRecord

pub mod assemble;
pub mod binge;
pub mod breakdown;
pub mod comparison;
pub mod completion;
pub mod distribution;
pub mod marathon;
pub mod model;
pub mod percentile;
pub mod period;
pub mod ranking;
pub mod streak;

pub use binge::BingeSession;
pub use breakdown::{ContentTypeBreakdown, DecadeBucket, TypeTotals};
pub use comparison::YearComparison;
pub use completion::{CompletionSource, PartialData, SeriesCompletion, ShowMetadataLookup};
pub use distribution::Histogram;
pub use marathon::{MarathonDay, MarathonItem};
pub use model::{ServerStats, Stats, SubjectRanking, UserStats, WatchMoment, WatchTotals};
pub use period::YearFilter;
pub use ranking::{RankedItem, RewatchItem};
pub use streak::WatchStreak;
