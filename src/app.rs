use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post, put},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/today", get(handlers::get_today))
        .route("/api/account", post(handlers::create_account))
        .route("/api/years/:year", get(handlers::get_year))
        .route("/api/months/:month_id", get(handlers::get_month))
        .route("/api/months/:month_id/progress", get(handlers::get_month_progress))
        .route("/api/weeks/:month_id/:week_id", get(handlers::get_week))
        .route("/api/weeks/:month_id/:week_id/toggle", post(handlers::toggle_habit))
        .route("/api/weeks/:month_id/:week_id/events", get(handlers::week_events))
        .route("/api/habits", get(handlers::list_habits).post(handlers::add_habit))
        .route("/api/habits/order", put(handlers::reorder_habits))
        .route(
            "/api/habits/:habit_id",
            patch(handlers::rename_habit).delete(handlers::remove_habit),
        )
        .with_state(state)
}
