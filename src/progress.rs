use crate::completion::CompletionRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

const DAYS_PER_WEEK: u32 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
    pub percentage: u32,
}

impl Progress {
    pub fn new(completed: u32, total: u32) -> Self {
        Self {
            completed,
            total,
            percentage: percentage(completed, total),
        }
    }
}

/// `round(100 * completed / total)`, rounding halves away from zero. Zero
/// when there is nothing to complete.
pub fn percentage(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let completed = u64::from(completed);
    let total = u64::from(total);
    ((200 * completed + total) / (2 * total)) as u32
}

fn counts(habit_id: &str, valid_ids: Option<&HashSet<String>>) -> bool {
    valid_ids.is_none_or(|ids| ids.contains(habit_id))
}

fn completed_in_day(entries: &BTreeMap<String, bool>, valid_ids: Option<&HashSet<String>>) -> u32 {
    entries
        .iter()
        .filter(|(habit_id, done)| **done && counts(habit_id, valid_ids))
        .count() as u32
}

/// Weekly progress against a fixed denominator of `habit_count * 7`,
/// regardless of how many days have entries. Habit ids missing from
/// `valid_ids` (deleted habits) are not counted.
pub fn aggregate_week(
    record: &CompletionRecord,
    habit_count: usize,
    valid_ids: Option<&HashSet<String>>,
) -> Progress {
    let total = (habit_count as u32).saturating_mul(DAYS_PER_WEEK);
    let completed = record
        .days()
        .map(|(_, entries)| completed_in_day(entries, valid_ids))
        .sum();
    Progress::new(completed, total)
}

/// Monthly progress against the entries actually present across the month's
/// week records. Unlike [`aggregate_week`] the denominator is observed, so
/// untouched cells do not pull the percentage down.
pub fn aggregate_month<'a>(
    records: impl IntoIterator<Item = &'a CompletionRecord>,
    valid_ids: Option<&HashSet<String>>,
) -> Progress {
    let mut completed = 0u32;
    let mut total = 0u32;
    for record in records {
        for (_, entries) in record.days() {
            for (habit_id, done) in entries {
                if !counts(habit_id, valid_ids) {
                    continue;
                }
                total += 1;
                if *done {
                    completed += 1;
                }
            }
        }
    }
    Progress::new(completed, total)
}

pub fn aggregate_day(
    entries: Option<&BTreeMap<String, bool>>,
    habit_count: usize,
    valid_ids: Option<&HashSet<String>>,
) -> Progress {
    let completed = entries.map_or(0, |entries| completed_in_day(entries, valid_ids));
    Progress::new(completed, habit_count as u32)
}
