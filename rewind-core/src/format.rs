//! Formatting helpers shared by the CLI and presentation layers.

use chrono::NaiveDate;

use crate::types::utc_from_timestamp;

/// Format minutes as hours and minutes (e.g., "312h 45m").
pub fn format_minutes(minutes: f64) -> String {
    let total = minutes.max(0.0).round() as i64;
    let hours = total / 60;
    let mins = total % 60;
    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

/// Full month name from a 0-based month index.
pub fn month_name(month0: usize) -> &'static str {
    match month0 {
        0 => "January",
        1 => "February",
        2 => "March",
        3 => "April",
        4 => "May",
        5 => "June",
        6 => "July",
        7 => "August",
        8 => "September",
        9 => "October",
        10 => "November",
        11 => "December",
        _ => "Unknown",
    }
}

/// Day name from index (0 = Sunday).
pub fn day_name(day: usize) -> &'static str {
    match day {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "Unknown",
    }
}

/// Hour range display (e.g., "10pm–11pm").
pub fn hour_display(hour: usize) -> String {
    let label = |h: usize| {
        let h = h % 24;
        let twelve = if h % 12 == 0 { 12 } else { h % 12 };
        let period = if h < 12 { "am" } else { "pm" };
        format!("{}{}", twelve, period)
    };
    format!("{}–{}", label(hour), label(hour + 1))
}

/// Format a unix timestamp as a short UTC date (e.g., "Mar 05").
pub fn format_timestamp_date(ts: i64) -> String {
    utc_from_timestamp(ts).format("%b %d").to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(312.0 * 60.0 + 45.0), "312h 45m");
        assert_eq!(format_minutes(59.6), "1h 0m");
        assert_eq!(format_minutes(0.0), "0m");
    }

    #[test]
    fn test_hour_display() {
        assert_eq!(hour_display(0), "12am–1am");
        assert_eq!(hour_display(10), "10am–11am");
        assert_eq!(hour_display(12), "12pm–1pm");
        assert_eq!(hour_display(23), "11pm–12am");
    }

    #[test]
    fn test_names() {
        assert_eq!(month_name(0), "January");
        assert_eq!(month_name(11), "December");
        assert_eq!(day_name(0), "Sunday");
        assert_eq!(day_name(6), "Saturday");
    }

    #[test]
    fn test_dates() {
        assert_eq!(format_timestamp_date(1_709_596_800), "Mar 05");
        assert_eq!(format_date(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()), "Dec 31");
    }
}
