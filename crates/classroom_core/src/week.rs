//! ISO-week arithmetic for the weekly project rotation.
//!
//! Week numbers are `iso_year * 100 + iso_week` (e.g. `202642`), so keys stay
//! unique across year boundaries and grow with time.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};

/// Length of one recommendation week.
pub fn week_length() -> Duration {
    Duration::days(7)
}

pub fn week_number_for(at: DateTime<Utc>) -> u32 {
    let iso = at.iso_week();
    (iso.year().max(0) as u32) * 100 + iso.week()
}

/// Monday 00:00 UTC of the ISO week containing `at`.
pub fn week_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    Utc.from_utc_datetime(&monday.and_time(NaiveTime::MIN))
}

/// `(start, end)` of the ISO week containing `at`; `end` is exclusive.
pub fn week_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = week_start(at);
    (start, start + week_length())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn week_number_encodes_iso_year_and_week() {
        // 2026-10-19 is the Monday of ISO week 43.
        assert_eq!(week_number_for(at(2026, 10, 19, 9)), 202643);
        // 2027-01-01 is a Friday that still belongs to ISO week 53 of 2026.
        assert_eq!(week_number_for(at(2027, 1, 1, 12)), 202653);
        assert_eq!(week_number_for(at(2027, 1, 4, 0)), 202701);
    }

    #[test]
    fn week_start_is_monday_midnight() {
        assert_eq!(week_start(at(2026, 10, 22, 17)), at(2026, 10, 19, 0));
        assert_eq!(week_start(at(2026, 10, 19, 0)), at(2026, 10, 19, 0));
        assert_eq!(week_start(at(2026, 10, 25, 23)), at(2026, 10, 19, 0));
    }

    #[test]
    fn bounds_span_seven_days() {
        let (start, end) = week_bounds(at(2026, 10, 21, 8));
        assert_eq!(end - start, Duration::days(7));
        assert_eq!(end, at(2026, 10, 26, 0));
    }
}
