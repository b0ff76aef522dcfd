use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::datetime::{CalendarDate, days_in_month, first_day_of_month, shift_year_month};
use crate::milestones::MilestoneEvent;

pub const GRID_SLOTS: usize = 42;
pub const STARTED_TOGETHER: &str = "Started together";
pub const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A displayed month (1-based month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ViewMonth {
    pub year: i32,
    pub month: u32,
}

impl ViewMonth {
    pub fn new(year: i32, month: u32) -> anyhow::Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(anyhow!("month must be 1-12, got {month}"));
        }
        Ok(Self { year, month })
    }

    pub fn containing(date: CalendarDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses `YYYY-MM`.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let token = input.trim();
        let (year, month) = token
            .split_once('-')
            .ok_or_else(|| anyhow!("expected YYYY-MM, got: {token}"))?;
        let year: i32 = year
            .parse()
            .with_context(|| format!("invalid year in {token}"))?;
        let month: u32 = month
            .parse()
            .with_context(|| format!("invalid month in {token}"))?;
        Self::new(year, month)
    }

    pub fn shift(self, months: i32) -> Self {
        let (year, month) = shift_year_month(self.year, self.month, months);
        Self { year, month }
    }

    pub fn first_day(self) -> CalendarDate {
        first_day_of_month(self.year, self.month)
    }

    pub fn day_count(self) -> u32 {
        days_in_month(self.year, self.month)
    }

    /// Sunday-based weekday of the first of the month (Sunday = 0).
    pub fn first_weekday(self) -> u32 {
        self.first_day().weekday().num_days_from_sunday()
    }

    pub fn date(self, day: u32) -> Option<CalendarDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }
}

impl fmt::Display for ViewMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day().format("%B %Y"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarCell {
    pub date: CalendarDate,
    pub day: u32,
    pub label: Option<String>,
    pub is_today: bool,
}

pub type MonthGrid = [Option<CalendarCell>; GRID_SLOTS];

/// Labels for every notable date: the start date plus each milestone. When
/// milestones share a date, the later one in the list wins.
pub fn important_dates(
    start: CalendarDate,
    milestones: &[MilestoneEvent],
) -> BTreeMap<CalendarDate, String> {
    let mut labels = BTreeMap::new();
    labels.insert(start, STARTED_TOGETHER.to_string());
    for event in milestones {
        labels.insert(event.date, event.title.clone());
    }
    labels
}

/// Six weeks of seven slots for `view`, Sunday first. Slots outside the
/// month are `None`.
pub fn build_month_grid(
    view: ViewMonth,
    milestones: &[MilestoneEvent],
    start: CalendarDate,
    today: CalendarDate,
) -> MonthGrid {
    let labels = important_dates(start, milestones);
    let first_weekday = i64::from(view.first_weekday());
    let day_count = i64::from(view.day_count());

    std::array::from_fn(|index| {
        let day = index as i64 - first_weekday + 1;
        if day < 1 || day > day_count {
            return None;
        }
        let day = day as u32;
        let date = view.date(day)?;
        Some(CalendarCell {
            date,
            day,
            label: labels.get(&date).cloned(),
            is_today: date == today,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milestones::upcoming_milestones;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn march_2024_starts_on_friday() {
        let view = ViewMonth::new(2024, 3).expect("view month");
        let start = ymd(2023, 1, 1);
        let grid = build_month_grid(view, &[], start, ymd(2024, 3, 10));

        assert_eq!(grid.len(), GRID_SLOTS);
        assert!(grid[..5].iter().all(Option::is_none));
        let first = grid[5].as_ref().expect("day 1 cell");
        assert_eq!(first.day, 1);
        let last = grid[35].as_ref().expect("day 31 cell");
        assert_eq!(last.day, 31);
        assert!(grid[36..].iter().all(Option::is_none));
        assert_eq!(grid.iter().flatten().count(), 31);

        let today: Vec<u32> = grid
            .iter()
            .flatten()
            .filter(|cell| cell.is_today)
            .map(|cell| cell.day)
            .collect();
        assert_eq!(today, vec![10]);
    }

    #[test]
    fn month_starting_sunday_fills_slot_zero() {
        let view = ViewMonth::new(2026, 2).expect("view month");
        let grid = build_month_grid(view, &[], ymd(2025, 1, 1), ymd(2026, 1, 1));
        assert_eq!(grid[0].as_ref().map(|cell| cell.day), Some(1));
        assert_eq!(grid.iter().flatten().count(), 28);
    }

    #[test]
    fn labels_start_and_milestones() {
        let start = ymd(2025, 10, 15);
        let events = upcoming_milestones(start, start);

        let october = build_month_grid(ViewMonth::containing(start), &events, start, start);
        let labelled: Vec<(u32, String)> = october
            .iter()
            .flatten()
            .filter_map(|cell| cell.label.clone().map(|label| (cell.day, label)))
            .collect();
        assert_eq!(labelled, vec![(15, STARTED_TOGETHER.to_string())]);

        let november = build_month_grid(ViewMonth::new(2025, 11).expect("view"), &events, start, start);
        let cell = november
            .iter()
            .flatten()
            .find(|cell| cell.day == 15)
            .expect("nov 15");
        assert_eq!(cell.label.as_deref(), Some("1st monthsary"));
        assert!(!cell.is_today);
    }

    #[test]
    fn shared_date_shows_anniversary() {
        let start = ymd(2025, 10, 15);
        let events = upcoming_milestones(start, ymd(2026, 9, 1));
        let labels = important_dates(start, &events);
        assert_eq!(
            labels.get(&ymd(2026, 10, 15)).map(String::as_str),
            Some("1st anniversary")
        );
    }

    #[test]
    fn view_month_navigation_and_parsing() {
        let view = ViewMonth::parse("2025-01").expect("parse");
        assert_eq!(view.shift(-1), ViewMonth { year: 2024, month: 12 });
        assert_eq!(view.shift(12), ViewMonth { year: 2026, month: 1 });
        assert_eq!(view.to_string(), "January 2025");
        assert!(ViewMonth::parse("2025-13").is_err());
        assert!(ViewMonth::parse("202501").is_err());
    }
}
