use crate::account::{SignupForm, UserProfile, initialize_profile};
use crate::auth::UserId;
use crate::calendar::{self, WeekDescriptor};
use crate::completion::{CompletionRecord, WeekKey};
use crate::errors::AppError;
use crate::habits::{Habit, HabitRegistry};
use crate::models::{
    DaySummary, HabitRequest, MonthProgressResponse, MonthResponse, MonthSummary, RecordEvent,
    ReorderRequest, TodayResponse, ToggleRequest, ToggleResponse, WeekResponse, WeekSummary,
    YearResponse,
};
use crate::progress::{aggregate_day, aggregate_month, aggregate_week};
use crate::state::AppState;
use crate::store::JsonStore;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::NaiveDate;
use futures_util::{Stream, stream};
use std::collections::HashSet;

pub async fn get_today() -> Json<TodayResponse> {
    Json(today_response(calendar::today()))
}

fn today_response(today: NaiveDate) -> TodayResponse {
    let week_id = calendar::weeks_in_month(today)
        .into_iter()
        .find(|week| week.days.contains(&today))
        .map(|week| week.id);
    TodayResponse {
        date: calendar::day_id(today),
        month_id: calendar::month_id(today),
        week_id,
        week: calendar::current_week(today),
    }
}

pub async fn create_account(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(form): Json<SignupForm>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let profile = initialize_profile(state.store.as_ref(), &user_id, &form).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_year(
    _user: UserId,
    Path(year): Path<i32>,
) -> Result<Json<YearResponse>, AppError> {
    let today = calendar::today();
    let year = calendar::year(year)?;
    let months = year
        .months
        .into_iter()
        .map(|month| MonthSummary {
            is_current: calendar::is_current_month_at(month.first_day, today),
            month,
        })
        .collect();
    Ok(Json(YearResponse {
        year: year.year,
        months,
    }))
}

pub async fn get_month(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(month_id): Path<String>,
) -> Result<Json<MonthResponse>, AppError> {
    let month = calendar::parse_month_id(&month_id)?;
    let (habits, valid) = habit_context(&state, &user_id).await?;
    let today = calendar::today();

    let weeks = state
        .completions
        .load_month(&user_id, month)
        .await?
        .into_iter()
        .map(|(week, record)| WeekSummary {
            is_current: calendar::is_current_week_at(week.start, today),
            progress: aggregate_week(&record, habits.len(), Some(&valid)),
            week,
        })
        .collect();

    Ok(Json(MonthResponse {
        month: calendar::month(month),
        weeks,
    }))
}

pub async fn get_month_progress(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(month_id): Path<String>,
) -> Result<Json<MonthProgressResponse>, AppError> {
    let month = calendar::parse_month_id(&month_id)?;
    let (_, valid) = habit_context(&state, &user_id).await?;
    let weeks = state.completions.load_month(&user_id, month).await?;
    let progress = aggregate_month(weeks.iter().map(|(_, record)| record), Some(&valid));

    Ok(Json(MonthProgressResponse {
        month_id: calendar::month_id(month),
        progress,
    }))
}

pub async fn get_week(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((month_id, week_id)): Path<(String, String)>,
) -> Result<Json<WeekResponse>, AppError> {
    let (month, week) = resolve_week(&month_id, &week_id)?;
    let (habits, valid) = habit_context(&state, &user_id).await?;
    let key = WeekKey::new(user_id, month, &week.id);
    let record = state.completions.snapshot(&key).await?;
    let today = calendar::today();

    let days = week
        .days
        .iter()
        .map(|date| {
            let day_id = calendar::day_id(*date);
            DaySummary {
                is_today: calendar::is_today_at(*date, today),
                progress: aggregate_day(record.day(&day_id), habits.len(), Some(&valid)),
                day_id,
            }
        })
        .collect();
    let progress = aggregate_week(&record, habits.len(), Some(&valid));

    Ok(Json(WeekResponse {
        month_id: key.month_id,
        week,
        habits,
        days,
        record,
        progress,
    }))
}

pub async fn toggle_habit(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((month_id, week_id)): Path<(String, String)>,
    Json(payload): Json<ToggleRequest>,
) -> Result<Json<ToggleResponse>, AppError> {
    let (month, week) = resolve_week(&month_id, &week_id)?;
    if !week.contains_day_id(&payload.day_id) {
        return Err(AppError::bad_request(format!(
            "day '{}' is not part of {}",
            payload.day_id, week.label
        )));
    }
    let (habits, valid) = habit_context(&state, &user_id).await?;
    if !valid.contains(&payload.habit_id) {
        return Err(AppError::bad_request(format!("unknown habit '{}'", payload.habit_id)));
    }

    let key = WeekKey::new(user_id, month, &week.id);
    let view = state.completions.view(&key).await?;
    let completed = state
        .completions
        .toggle(&view, &payload.day_id, &payload.habit_id)
        .await?;
    let record = view.snapshot();
    let progress = aggregate_week(&record, habits.len(), Some(&valid));

    Ok(Json(ToggleResponse {
        day_id: payload.day_id,
        habit_id: payload.habit_id,
        completed,
        record,
        progress,
    }))
}

/// Streams the week's record: the current snapshot first, then one event per
/// stored change until the client disconnects.
pub async fn week_events(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((month_id, week_id)): Path<(String, String)>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let (month, week) = resolve_week(&month_id, &week_id)?;
    let key = WeekKey::new(user_id, month, &week.id);
    let subscription = state.completions.subscribe(&key)?;
    let initial = state.completions.snapshot(&key).await?;
    let habits = state.habits.clone();
    let user_id = key.user_id.clone();

    let events = stream::unfold((subscription, Some(initial)), move |(mut subscription, pending)| {
        let habits = habits.clone();
        let user_id = user_id.clone();
        async move {
            let event = match pending {
                Some(record) => record_event(&habits, &user_id, record).await,
                None => match subscription.next().await? {
                    Ok(record) => record_event(&habits, &user_id, record).await,
                    Err(err) => Err(axum::Error::new(err)),
                },
            };
            Some((event, (subscription, None)))
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn record_event(
    habits: &HabitRegistry<JsonStore>,
    user_id: &str,
    record: CompletionRecord,
) -> Result<Event, axum::Error> {
    let list = habits.list(user_id).await.map_err(axum::Error::new)?;
    let valid: HashSet<String> = list.iter().map(|habit| habit.id.clone()).collect();
    let progress = aggregate_week(&record, list.len(), Some(&valid));
    Event::default()
        .event("record")
        .json_data(RecordEvent { record, progress })
}

pub async fn list_habits(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<Vec<Habit>>, AppError> {
    Ok(Json(state.habits.list(&user_id).await?))
}

pub async fn add_habit(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(payload): Json<HabitRequest>,
) -> Result<(StatusCode, Json<Habit>), AppError> {
    let habit = state.habits.add(&user_id, &payload.label).await?;
    Ok((StatusCode::CREATED, Json(habit)))
}

pub async fn rename_habit(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(habit_id): Path<String>,
    Json(payload): Json<HabitRequest>,
) -> Result<Json<Habit>, AppError> {
    Ok(Json(state.habits.rename(&user_id, &habit_id, &payload.label).await?))
}

pub async fn remove_habit(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(habit_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.habits.remove(&user_id, &habit_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reorder_habits(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(payload): Json<ReorderRequest>,
) -> Result<Json<Vec<Habit>>, AppError> {
    Ok(Json(state.habits.reorder(&user_id, &payload.ids).await?))
}

fn resolve_week(month_id: &str, week_id: &str) -> Result<(NaiveDate, WeekDescriptor), AppError> {
    let month = calendar::parse_month_id(month_id)?;
    let week = calendar::find_week(month, week_id)
        .ok_or_else(|| AppError::not_found(format!("week '{week_id}' not found in {month_id}")))?;
    Ok((month, week))
}

async fn habit_context(
    state: &AppState,
    user_id: &str,
) -> Result<(Vec<Habit>, HashSet<String>), AppError> {
    let habits = state.habits.list(user_id).await?;
    let valid = habits.iter().map(|habit| habit.id.clone()).collect();
    Ok((habits, valid))
}
