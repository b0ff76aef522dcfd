use chrono::Datelike;
use serde::Serialize;

use crate::datetime::{CalendarDate, days_in_month, shift_year_month};

/// Time spent together, both as a calendar reading ("1 year, 2 months,
/// 3 days") and as linear day/week counters. The two views are independent:
/// calendar months vary in length, so they do not reconcile by
/// multiplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurationBreakdown {
    pub years: i64,
    pub months: i64,
    pub days: i64,
    pub total_days: i64,
    pub total_weeks: i64,
}

/// Elapsed time from `start` to `now`. A `now` before `start` is clamped to
/// `start`, producing an all-zero breakdown.
#[must_use]
pub fn compute_duration(start: CalendarDate, now: CalendarDate) -> DurationBreakdown {
    let now = now.max(start);

    let mut years = i64::from(now.year()) - i64::from(start.year());
    let mut months = i64::from(now.month()) - i64::from(start.month());
    let mut days = i64::from(now.day()) - i64::from(start.day());

    // Borrow from the months preceding `now`. One borrow is not always
    // enough: Jan 31 -> Mar 1 borrows February and is still negative.
    let mut borrow_from = -1;
    while days < 0 {
        let (year, month) = shift_year_month(now.year(), now.month(), borrow_from);
        days += i64::from(days_in_month(year, month));
        months -= 1;
        borrow_from -= 1;
    }

    while months < 0 {
        months += 12;
        years -= 1;
    }

    let total_days = (now - start).num_days();
    DurationBreakdown {
        years,
        months,
        days,
        total_days,
        total_weeks: total_days.div_euclid(7),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn same_day_is_all_zero() {
        let start = ymd(2025, 10, 15);
        assert_eq!(compute_duration(start, start), DurationBreakdown::default());
    }

    #[test]
    fn now_before_start_is_clamped() {
        let start = ymd(2025, 10, 15);
        assert_eq!(
            compute_duration(start, ymd(2024, 1, 1)),
            compute_duration(start, start)
        );
    }

    #[test]
    fn borrows_days_from_previous_month() {
        // Oct 15 -> Dec 3: borrow November (30 days).
        let got = compute_duration(ymd(2025, 10, 15), ymd(2025, 12, 3));
        assert_eq!((got.years, got.months, got.days), (0, 1, 18));
        assert_eq!(got.total_days, 49);
        assert_eq!(got.total_weeks, 7);
    }

    #[test]
    fn borrows_months_from_years() {
        let got = compute_duration(ymd(2024, 12, 31), ymd(2025, 1, 1));
        assert_eq!((got.years, got.months, got.days), (0, 0, 1));
        assert_eq!(got.total_days, 1);

        let got = compute_duration(ymd(2023, 11, 20), ymd(2025, 2, 10));
        assert_eq!((got.years, got.months, got.days), (1, 2, 21));
    }

    #[test]
    fn double_borrow_keeps_days_non_negative() {
        let got = compute_duration(ymd(2023, 1, 31), ymd(2023, 3, 1));
        assert_eq!((got.years, got.months, got.days), (0, 0, 29));
        assert_eq!(got.total_days, 29);
    }

    #[test]
    fn full_years() {
        let got = compute_duration(ymd(2020, 2, 29), ymd(2024, 2, 29));
        assert_eq!((got.years, got.months, got.days), (4, 0, 0));
        assert_eq!(got.total_days, 1461);
        assert_eq!(got.total_weeks, 208);
    }

    fn any_date() -> impl Strategy<Value = NaiveDate> {
        (1990i32..2060, 1u32..=12, 1u32..=31).prop_map(|(y, m, d)| {
            let day = d.min(crate::datetime::days_in_month(y, m));
            NaiveDate::from_ymd_opt(y, m, day).expect("clamped date is valid")
        })
    }

    proptest! {
        #[test]
        fn fields_stay_in_calendar_ranges(a in any_date(), b in any_date()) {
            let (start, now) = if a <= b { (a, b) } else { (b, a) };
            let got = compute_duration(start, now);
            prop_assert!(got.years >= 0);
            prop_assert!((0..=11).contains(&got.months));
            prop_assert!((0..=30).contains(&got.days));
            prop_assert_eq!(got.total_days, (now - start).num_days());
            prop_assert_eq!(got.total_weeks, got.total_days / 7);
        }

        #[test]
        fn calendar_reading_reconstructs_now(a in any_date(), b in any_date()) {
            let (start, now) = if a <= b { (a, b) } else { (b, a) };
            let got = compute_duration(start, now);
            let whole_months = i32::try_from(got.years * 12 + got.months).expect("fits i32");
            let anchor = crate::datetime::add_months(start, whole_months);
            prop_assert!(anchor <= now);
            prop_assert!((now - anchor).num_days() >= got.days - 3);
        }
    }
}
