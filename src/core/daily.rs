//! Due-check for recurring daily tasks.

use chrono::{NaiveDate, NaiveTime};

/// Whether a daily task should be claimed now.
///
/// Due iff it is enabled, it last ran before `today` (or never ran), and the
/// wall clock has reached the configured time of day.
#[must_use]
pub fn is_due(
    last_executed: Option<NaiveDate>,
    today: NaiveDate,
    now: NaiveTime,
    execution_time: NaiveTime,
    enabled: bool,
) -> bool {
    enabled && last_executed.is_none_or(|last| last < today) && now >= execution_time
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn due_after_configured_time_when_last_run_was_yesterday() {
        assert!(is_due(Some(date(9)), date(10), time(9, 0), time(8, 0), true));
    }

    #[test]
    fn not_due_twice_on_the_same_day() {
        assert!(!is_due(Some(date(10)), date(10), time(9, 0), time(8, 0), true));
    }

    #[test]
    fn disabled_is_never_due() {
        assert!(!is_due(Some(date(9)), date(10), time(9, 0), time(8, 0), false));
    }

    #[test]
    fn not_due_before_configured_time() {
        assert!(!is_due(Some(date(9)), date(10), time(7, 0), time(8, 0), true));
    }

    #[test]
    fn due_exactly_at_configured_time() {
        assert!(is_due(Some(date(9)), date(10), time(8, 0), time(8, 0), true));
    }

    #[test]
    fn never_executed_counts_as_before_today() {
        assert!(is_due(None, date(10), time(8, 0), time(8, 0), true));
    }
}
