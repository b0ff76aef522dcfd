use std::cmp::Ordering;

use serde::Serialize;

use crate::datetime::{CalendarDate, add_months};

pub const MONTHSARY_COUNT: u32 = 24;
pub const ANNIVERSARY_COUNT: u32 = 5;
pub const UPCOMING_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneKind {
    Monthsary,
    Anniversary,
}

impl MilestoneKind {
    pub fn noun(self) -> &'static str {
        match self {
            MilestoneKind::Monthsary => "monthsary",
            MilestoneKind::Anniversary => "anniversary",
        }
    }

    fn months_per_step(self) -> i32 {
        match self {
            MilestoneKind::Monthsary => 1,
            MilestoneKind::Anniversary => 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneEvent {
    pub kind: MilestoneKind,
    pub index: u32,
    pub title: String,
    pub date: CalendarDate,
}

impl MilestoneEvent {
    pub fn new(kind: MilestoneKind, index: u32, start: CalendarDate) -> Self {
        let months = kind.months_per_step().saturating_mul(index as i32);
        Self {
            kind,
            index,
            title: format!("{index}{} {}", ordinal_suffix(index), kind.noun()),
            date: add_months(start, months),
        }
    }

    /// Sort order for the upcoming list: date first, then monthsaries before
    /// anniversaries, then by index.
    pub fn chronological(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then(self.kind.cmp(&other.kind))
            .then(self.index.cmp(&other.index))
    }
}

/// English ordinal suffix; 11, 12 and 13 (and 111, 112, ...) take "th".
pub fn ordinal_suffix(n: u32) -> &'static str {
    let ones = n % 10;
    let tens = n % 100;
    match (ones, tens) {
        (1, t) if t != 11 => "st",
        (2, t) if t != 12 => "nd",
        (3, t) if t != 13 => "rd",
        _ => "th",
    }
}

/// Every candidate milestone after `start`, unfiltered and unsorted:
/// monthsaries 1..=24 followed by anniversaries 1..=5.
pub fn milestone_candidates(start: CalendarDate) -> impl Iterator<Item = MilestoneEvent> {
    let monthsaries =
        (1..=MONTHSARY_COUNT).map(move |i| MilestoneEvent::new(MilestoneKind::Monthsary, i, start));
    let anniversaries = (1..=ANNIVERSARY_COUNT)
        .map(move |i| MilestoneEvent::new(MilestoneKind::Anniversary, i, start));
    monthsaries.chain(anniversaries)
}

/// The next milestones on or after `now`, sorted ascending, at most
/// [`UPCOMING_LIMIT`] entries. Equal dates are not deduplicated: the 12th
/// monthsary and the 1st anniversary share a date and both appear.
#[tracing::instrument(level = "trace")]
pub fn upcoming_milestones(start: CalendarDate, now: CalendarDate) -> Vec<MilestoneEvent> {
    let mut upcoming: Vec<MilestoneEvent> = milestone_candidates(start)
        .filter(|event| event.date >= now)
        .collect();
    upcoming.sort_by(MilestoneEvent::chronological);
    upcoming.truncate(UPCOMING_LIMIT);
    tracing::trace!(count = upcoming.len(), "computed upcoming milestones");
    upcoming
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
    fn ordinal_suffixes_follow_english_rules() {
        let got: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 23, 24, 101, 111, 112]
            .into_iter()
            .map(|n| format!("{n}{}", ordinal_suffix(n)))
            .collect();
        assert_eq!(
            got,
            vec![
                "1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd", "23rd",
                "24th", "101st", "111th", "112th"
            ]
        );
    }

    #[test]
    fn first_upcoming_from_start_day_is_first_monthsary() {
        let start = ymd(2025, 10, 15);
        let events = upcoming_milestones(start, start);
        assert_eq!(events.len(), UPCOMING_LIMIT);
        assert_eq!(events[0].title, "1st monthsary");
        assert_eq!(events[0].date, ymd(2025, 11, 15));
        assert_eq!(events[9].title, "10th monthsary");
    }

    #[test]
    fn monthsary_clamps_to_month_end() {
        let events = upcoming_milestones(ymd(2024, 1, 31), ymd(2024, 1, 31));
        assert_eq!(events[0].date, ymd(2024, 2, 29));
        assert_eq!(events[1].date, ymd(2024, 3, 31));
        assert_eq!(events[2].date, ymd(2024, 4, 30));
    }

    #[test]
    fn coinciding_dates_put_monthsary_first() {
        let start = ymd(2025, 10, 15);
        let events = upcoming_milestones(start, ymd(2026, 9, 1));
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            &titles[..4],
            &["11th monthsary", "12th monthsary", "1st anniversary", "13th monthsary"]
        );
        assert_eq!(events[1].date, events[2].date);
    }

    #[test]
    fn milestone_on_now_is_kept() {
        let start = ymd(2025, 10, 15);
        let events = upcoming_milestones(start, ymd(2025, 12, 15));
        assert_eq!(events[0].title, "2nd monthsary");
        assert_eq!(events[0].date, ymd(2025, 12, 15));
    }

    #[test]
    fn only_late_anniversaries_remain_after_monthsaries() {
        let start = ymd(2025, 10, 15);
        let events = upcoming_milestones(start, ymd(2027, 11, 1));
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["3rd anniversary", "4th anniversary", "5th anniversary"]);
    }

    #[test]
    fn far_future_has_no_milestones() {
        let start = ymd(2025, 10, 15);
        assert!(upcoming_milestones(start, ymd(2033, 1, 1)).is_empty());
    }

    fn any_date() -> impl Strategy<Value = NaiveDate> {
        (2000i32..2040, 1u32..=12, 1u32..=28)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).expect("valid date"))
    }

    proptest! {
        #[test]
        fn upcoming_is_bounded_sorted_and_not_past(start in any_date(), now in any_date()) {
            let events = upcoming_milestones(start, now);
            prop_assert!(events.len() <= UPCOMING_LIMIT);
            prop_assert!(events.windows(2).all(|w| w[0].date <= w[1].date));
            prop_assert!(events.iter().all(|e| e.date >= now));
        }
    }
}
