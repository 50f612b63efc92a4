use crate::calendar::{CurrentWeek, MonthDescriptor, WeekDescriptor};
use crate::completion::CompletionRecord;
use crate::habits::Habit;
use crate::progress::Progress;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TodayResponse {
    pub date: String,
    pub month_id: String,
    pub week_id: Option<String>,
    pub week: CurrentWeek,
}

#[derive(Debug, Serialize)]
pub struct MonthSummary {
    #[serde(flatten)]
    pub month: MonthDescriptor,
    pub is_current: bool,
}

#[derive(Debug, Serialize)]
pub struct YearResponse {
    pub year: i32,
    pub months: Vec<MonthSummary>,
}

#[derive(Debug, Serialize)]
pub struct WeekSummary {
    #[serde(flatten)]
    pub week: WeekDescriptor,
    pub is_current: bool,
    pub progress: Progress,
}

#[derive(Debug, Serialize)]
pub struct MonthResponse {
    pub month: MonthDescriptor,
    pub weeks: Vec<WeekSummary>,
}

#[derive(Debug, Serialize)]
pub struct MonthProgressResponse {
    pub month_id: String,
    pub progress: Progress,
}

#[derive(Debug, Serialize)]
pub struct DaySummary {
    pub day_id: String,
    pub is_today: bool,
    pub progress: Progress,
}

#[derive(Debug, Serialize)]
pub struct WeekResponse {
    pub month_id: String,
    pub week: WeekDescriptor,
    pub habits: Vec<Habit>,
    pub days: Vec<DaySummary>,
    pub record: CompletionRecord,
    pub progress: Progress,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub day_id: String,
    pub habit_id: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub day_id: String,
    pub habit_id: String,
    pub completed: bool,
    pub record: CompletionRecord,
    pub progress: Progress,
}

/// Pushed on the week event stream after every stored change.
#[derive(Debug, Serialize)]
pub struct RecordEvent {
    pub record: CompletionRecord,
    pub progress: Progress,
}

#[derive(Debug, Deserialize)]
pub struct HabitRequest {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub ids: Vec<String>,
}
