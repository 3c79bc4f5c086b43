//! Year-over-year watch time comparison.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearComparison {
    pub previous_year: i32,
    pub current_minutes: f64,
    pub previous_minutes: f64,
    /// Change in percent, rounded to one decimal
    pub percent_change: f64,
}

impl YearComparison {
    /// Format change for display (e.g., "+23.5%" or "-15.0%").
    pub fn format_change(&self) -> String {
        if self.percent_change >= 0.0 {
            format!("+{:.1}%", self.percent_change)
        } else {
            format!("{:.1}%", self.percent_change)
        }
    }
}

/// Percent change between two totals.
///
/// Growth from zero is reported as 100%. Returns None when both are zero.
pub fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        if current == 0.0 {
            None
        } else {
            Some(100.0)
        }
    } else {
        let pct = (current - previous) / previous * 100.0;
        Some((pct * 10.0).round() / 10.0)
    }
}

pub fn compare_years(
    current_minutes: f64,
    previous_minutes: f64,
    previous_year: i32,
) -> Option<YearComparison> {
    percent_change(current_minutes, previous_minutes).map(|percent_change| YearComparison {
        previous_year,
        current_minutes,
        previous_minutes,
        percent_change,
    })
}
