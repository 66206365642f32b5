//! Tests for utility functions

use chrono::{NaiveDate, TimeDelta};
use task_manager::util::{now_ms, Clock, FixedClock, SystemClock};

#[test]
fn test_fixed_clock_advances() {
    let start = NaiveDate::from_ymd_opt(2024, 12, 31)
        .unwrap()
        .and_hms_opt(23, 30, 0)
        .unwrap();
    let clock = FixedClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(TimeDelta::hours(1));
    assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
}

#[test]
fn test_system_clock_is_close_to_now_ms() {
    let before = now_ms();
    let today = SystemClock.today();
    assert!(before > 0);
    assert!(today > NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
}
