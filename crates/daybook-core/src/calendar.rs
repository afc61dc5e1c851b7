//! Calendar grids, period navigation and completion streaks.
//!
//! Weeks start on Sunday. Month grids always span six weeks (42 days) so the
//! leading and trailing days of neighbouring months are included and flagged.

use std::{fmt, str::FromStr};

use chrono::{Datelike, NaiveDate, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};

use crate::tasks::{ParseValueError, Task};

pub const DAYS_PER_WEEK: usize = 7;
pub const MONTH_GRID_DAYS: usize = 42;

/// Calendar display mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Week,
    Month,
    Year,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            _ => Err(ParseValueError::new("view", s)),
        }
    }
}

/// Displayed period, mode, and the optional day the task list is narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarState {
    pub anchor: NaiveDate,
    pub granularity: Granularity,
    pub selected: Option<NaiveDate>,
}

impl CalendarState {
    pub fn new(today: NaiveDate, granularity: Granularity) -> Self {
        Self {
            anchor: today,
            granularity,
            selected: None,
        }
    }
}

/// One slot of a month grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDay {
    pub date: NaiveDate,
    /// Day belongs to the previous or next month.
    pub other_month: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub days: Vec<GridDay>,
}

/// Render hints for a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub other_month: bool,
    pub today: bool,
    pub selected: bool,
    pub has_tasks: bool,
    pub weekend: bool,
}

/// The Sunday on or before `date`.
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    add_days(date, -i64::from(date.weekday().num_days_from_sunday()))
}

pub fn has_tasks_on(date: NaiveDate, tasks: &[Task]) -> bool {
    tasks.iter().any(|t| t.date == date)
}

pub fn generate_week(anchor: NaiveDate) -> [NaiveDate; DAYS_PER_WEEK] {
    let start = start_of_week(anchor);
    std::array::from_fn(|offset| add_days(start, offset as i64))
}

pub fn generate_month_grid(anchor: NaiveDate) -> MonthGrid {
    month_grid(anchor.year(), anchor.month())
}

pub fn generate_year_grid(anchor: NaiveDate) -> Vec<MonthGrid> {
    (1..=12).map(|month| month_grid(anchor.year(), month)).collect()
}

fn month_grid(year: i32, month: u32) -> MonthGrid {
    let start = start_of_week(first_day_of_month(year, month));
    let days = (0..MONTH_GRID_DAYS)
        .map(|offset| {
            let date = add_days(start, offset as i64);
            GridDay {
                date,
                other_month: date.month() != month || date.year() != year,
            }
        })
        .collect();
    MonthGrid { year, month, days }
}

/// Move the anchor one period forward (`direction > 0`) or back.
///
/// Month and year steps keep the day-of-month and let it overflow into the
/// following month: Jan 31 + 1 month is Mar 2 (Mar 3 outside leap years) and
/// Feb 29 + 1 year is Mar 1. A step past the representable date range leaves
/// the anchor where it is.
pub fn navigate(anchor: NaiveDate, granularity: Granularity, direction: i32) -> NaiveDate {
    let moved = match granularity {
        Granularity::Week => Some(add_days(anchor, i64::from(direction) * 7)),
        Granularity::Month => shift_months(anchor, direction),
        Granularity::Year => direction
            .checked_mul(12)
            .and_then(|months| shift_months(anchor, months)),
    };
    moved.unwrap_or(anchor)
}

fn shift_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    let index = date
        .year()
        .checked_mul(12)?
        .checked_add(date.month0() as i32)?
        .checked_add(months)?;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_signed(TimeDelta::days(i64::from(date.day0())))
}

/// Consecutive days, ending today, with at least one completed task dated that day.
pub fn streak(tasks: &[Task], today: NaiveDate) -> u32 {
    let mut count = 0;
    let mut day = today;
    while tasks.iter().any(|t| t.completed && t.date == day) {
        count += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    count
}

pub fn mark_days(
    days: impl IntoIterator<Item = GridDay>,
    today: NaiveDate,
    selected: Option<NaiveDate>,
    tasks: &[Task],
) -> Vec<DayCell> {
    days.into_iter()
        .map(|day| DayCell {
            date: day.date,
            other_month: day.other_month,
            today: day.date == today,
            selected: selected == Some(day.date),
            has_tasks: has_tasks_on(day.date, tasks),
            weekend: matches!(day.date.weekday(), Weekday::Sat | Weekday::Sun),
        })
        .collect()
}

/// Header text for the displayed period.
pub fn period_title(anchor: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Week => {
            let start = start_of_week(anchor);
            let end = add_days(start, 6);
            if start.year() != end.year() || start.month() != end.month() {
                format!(
                    "{} - {}",
                    start.format("%B %-d, %Y"),
                    end.format("%B %-d, %Y")
                )
            } else {
                format!(
                    "{} - {}, {}",
                    start.format("%B %-d"),
                    end.day(),
                    end.year()
                )
            }
        }
        Granularity::Month => anchor.format("%B %Y").to_string(),
        Granularity::Year => anchor.year().to_string(),
    }
}

pub fn weekday_label(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Sun => "Sun",
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
    }
}

fn first_day_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(TimeDelta::days(days)).unwrap_or(date)
}
