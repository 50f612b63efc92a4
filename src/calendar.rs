//! Calendar partitions: years into months, months into Sunday-start weeks,
//! weeks into days. Nothing here is persisted.

use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("invalid month id '{0}', expected YYYY-MM")]
    InvalidMonthId(String),
    #[error("month {month} of year {year} is out of range")]
    InvalidMonth { year: i32, month: u32 },
    #[error("year {0} is out of range")]
    InvalidYear(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekDescriptor {
    pub id: String,
    pub label: String,
    pub week_number: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: [NaiveDate; 7],
}

impl WeekDescriptor {
    pub fn contains_day_id(&self, day: &str) -> bool {
        self.days.iter().any(|date| day_id(*date) == day)
    }

    pub fn day_ids(&self) -> Vec<String> {
        self.days.iter().map(|date| day_id(*date)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthDescriptor {
    pub id: String,
    pub year: i32,
    pub month: u32,
    pub first_day: NaiveDate,
    pub label: String,
    pub short_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearDescriptor {
    pub year: i32,
    pub months: Vec<MonthDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentWeek {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub week_number: u32,
    pub year: i32,
    pub month: u32,
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn day_id(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn month_id(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn week_id(index: usize) -> String {
    format!("week-{}", index + 1)
}

pub fn month_start(year: i32, month: u32) -> Result<NaiveDate, CalendarError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(CalendarError::InvalidMonth { year, month })
}

/// Parses a `YYYY-MM` id into the first day of that month.
pub fn parse_month_id(id: &str) -> Result<NaiveDate, CalendarError> {
    let invalid = || CalendarError::InvalidMonthId(id.to_string());
    let (year, month) = id.split_once('-').ok_or_else(invalid)?;
    let digits = |part: &str, len: usize| {
        part.len() == len && part.chars().all(|c| c.is_ascii_digit())
    };
    if !digits(year, 4) || !digits(month, 2) {
        return Err(invalid());
    }
    let year = year.parse::<i32>().map_err(|_| invalid())?;
    let month = month.parse::<u32>().map_err(|_| invalid())?;
    month_start(year, month).map_err(|_| invalid())
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

pub fn week_end(date: NaiveDate) -> NaiveDate {
    week_start(date) + Duration::days(6)
}

pub fn days_in_week(date: NaiveDate) -> [NaiveDate; 7] {
    let start = week_start(date);
    std::array::from_fn(|offset| start + Duration::days(offset as i64))
}

/// Sunday-based week of the year; week 1 is the week holding January 1.
pub fn week_number(date: NaiveDate) -> u32 {
    let start = week_start(date);
    let week_year = (start + Duration::days(6)).year();
    let first_week = match NaiveDate::from_ymd_opt(week_year, 1, 1) {
        Some(jan_first) => week_start(jan_first),
        None => return 1,
    };
    ((start - first_week).num_days() / 7) as u32 + 1
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

/// Every Sunday-start week overlapping the month of `date`. Boundary weeks
/// keep their days from the adjacent months.
pub fn weeks_in_month(date: NaiveDate) -> Vec<WeekDescriptor> {
    let first = date.with_day(1).unwrap_or(date);
    let last = last_day_of_month(first);

    let mut weeks = Vec::with_capacity(6);
    let mut start = week_start(first);
    while start <= last {
        let index = weeks.len();
        weeks.push(WeekDescriptor {
            id: week_id(index),
            label: format!("Week {}", index + 1),
            week_number: week_number(start),
            start,
            end: start + Duration::days(6),
            days: days_in_week(start),
        });
        start += Duration::weeks(1);
    }
    weeks
}

pub fn find_week(date: NaiveDate, id: &str) -> Option<WeekDescriptor> {
    weeks_in_month(date).into_iter().find(|week| week.id == id)
}

pub fn month(date: NaiveDate) -> MonthDescriptor {
    let first_day = date.with_day(1).unwrap_or(date);
    MonthDescriptor {
        id: month_id(first_day),
        year: first_day.year(),
        month: first_day.month(),
        first_day,
        label: first_day.format("%B").to_string(),
        short_label: first_day.format("%b").to_string(),
    }
}

pub fn months_in_year(year: i32) -> Result<Vec<MonthDescriptor>, CalendarError> {
    (1..=12)
        .map(|number| {
            month_start(year, number)
                .map(month)
                .map_err(|_| CalendarError::InvalidYear(year))
        })
        .collect()
}

pub fn year(year: i32) -> Result<YearDescriptor, CalendarError> {
    Ok(YearDescriptor {
        year,
        months: months_in_year(year)?,
    })
}

pub fn current_week(today: NaiveDate) -> CurrentWeek {
    CurrentWeek {
        start: week_start(today),
        end: week_end(today),
        week_number: week_number(today),
        year: today.year(),
        month: today.month(),
    }
}

pub fn is_current_week(date: NaiveDate) -> bool {
    is_current_week_at(date, today())
}

pub fn is_current_week_at(date: NaiveDate, today: NaiveDate) -> bool {
    week_start(date) == week_start(today)
}

pub fn is_current_month(date: NaiveDate) -> bool {
    is_current_month_at(date, today())
}

pub fn is_current_month_at(date: NaiveDate, today: NaiveDate) -> bool {
    date.year() == today.year() && date.month() == today.month()
}

pub fn is_today(date: NaiveDate) -> bool {
    is_today_at(date, today())
}

pub fn is_today_at(date: NaiveDate, today: NaiveDate) -> bool {
    date == today
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use std::collections::BTreeSet;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn february_leap_year_weeks_span_sunday_to_saturday() {
        let weeks = weeks_in_month(date(2024, 2, 1));
        let first = weeks.first().unwrap();
        let last = weeks.last().unwrap();

        assert_eq!(first.start, date(2024, 1, 28));
        assert_eq!(first.start.weekday(), Weekday::Sun);
        assert_eq!(last.end, date(2024, 3, 2));
        assert_eq!(last.end.weekday(), Weekday::Sat);
        assert_eq!(weeks.len(), 5);
        assert_eq!(first.id, "week-1");
        assert_eq!(last.label, "Week 5");
    }

    #[test]
    fn weeks_cover_every_day_of_each_month() {
        for month in 1..=12 {
            let first = date(2025, month, 1);
            let last = last_day_of_month(first);
            let covered: BTreeSet<NaiveDate> = weeks_in_month(first)
                .iter()
                .flat_map(|week| week.days)
                .collect();

            let mut day = first;
            while day <= last {
                assert!(covered.contains(&day), "{day} missing");
                day += Duration::days(1);
            }
            for week in weeks_in_month(first) {
                assert_eq!(week.days.len(), 7);
                assert_eq!(week.days[0], week.start);
                assert_eq!(week.days[6], week.end);
            }
        }
    }

    #[test]
    fn month_starting_on_sunday_has_no_leading_spillover() {
        // September 2024 starts on a Sunday.
        let weeks = weeks_in_month(date(2024, 9, 17));
        assert_eq!(weeks[0].start, date(2024, 9, 1));
        assert_eq!(weeks.last().unwrap().end, date(2024, 10, 5));
    }

    #[test]
    fn week_numbers_follow_sunday_weeks_holding_january_first() {
        assert_eq!(week_number(date(2024, 1, 1)), 1);
        assert_eq!(week_number(date(2024, 1, 7)), 2);
        // The week of Dec 29 2024 holds Jan 1 2025.
        assert_eq!(week_number(date(2024, 12, 29)), 1);
        assert_eq!(week_number(date(2024, 12, 28)), 52);
    }

    #[test]
    fn ids_are_zero_padded() {
        assert_eq!(day_id(date(2024, 6, 3)), "2024-06-03");
        assert_eq!(month_id(date(2024, 6, 3)), "2024-06");
        assert_eq!(week_id(0), "week-1");
    }

    #[test]
    fn parse_month_id_rejects_instead_of_wrapping() {
        assert_eq!(parse_month_id("2024-06"), Ok(date(2024, 6, 1)));
        assert!(parse_month_id("2024-13").is_err());
        assert!(parse_month_id("2024-00").is_err());
        assert!(parse_month_id("2024-6").is_err());
        assert!(parse_month_id("june").is_err());
        assert!(month_start(2024, 0).is_err());
    }

    #[test]
    fn parse_month_id_accepts_only_canonical_digits() {
        for id in ["+024-06", "-024-06", "2024-+6", " 024-06", "2024-0x"] {
            assert_eq!(
                parse_month_id(id),
                Err(CalendarError::InvalidMonthId(id.to_string())),
                "{id}"
            );
        }
        let parsed = parse_month_id("0024-06").unwrap();
        assert_eq!(month_id(parsed), "0024-06");
    }

    #[test]
    fn year_holds_its_twelve_months() {
        let descriptor = year(2025).unwrap();
        assert_eq!(descriptor.year, 2025);
        assert_eq!(descriptor.months.len(), 12);
        assert!(descriptor.months.iter().all(|month| month.year == 2025));
    }

    #[test]
    fn months_in_year_are_labeled() {
        let months = months_in_year(2024).unwrap();
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].id, "2024-01");
        assert_eq!(months[0].label, "January");
        assert_eq!(months[8].short_label, "Sep");
        assert_eq!(months[11].month, 12);
    }

    #[test]
    fn find_week_returns_none_for_unknown_id() {
        let june = date(2024, 6, 1);
        assert!(find_week(june, "week-6").is_some());
        assert!(find_week(june, "week-7").is_none());
        assert!(find_week(june, "bogus").is_none());
    }

    #[test]
    fn predicates_compare_against_reference_day() {
        let today = date(2024, 6, 5);
        assert!(is_current_week_at(date(2024, 6, 2), today));
        assert!(is_current_week_at(date(2024, 6, 8), today));
        assert!(!is_current_week_at(date(2024, 6, 9), today));
        assert!(is_current_month_at(date(2024, 6, 30), today));
        assert!(!is_current_month_at(date(2023, 6, 5), today));
        assert!(is_today_at(today, today));
        assert!(!is_today_at(date(2024, 6, 4), today));
    }

    #[test]
    fn current_week_reports_today_context() {
        let week = current_week(date(2024, 6, 5));
        assert_eq!(week.start, date(2024, 6, 2));
        assert_eq!(week.end, date(2024, 6, 8));
        assert_eq!(week.month, 6);
        assert_eq!(week.year, 2024);
    }

    #[test]
    fn week_descriptor_knows_its_days() {
        let week = find_week(date(2024, 6, 1), "week-1").unwrap();
        assert!(week.contains_day_id("2024-05-26"));
        assert!(week.contains_day_id("2024-06-01"));
        assert!(!week.contains_day_id("2024-06-02"));
        assert_eq!(week.day_ids().len(), 7);
    }
}
