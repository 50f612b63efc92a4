pub mod account;
pub mod app;
pub mod auth;
pub mod calendar;
pub mod completion;
pub mod config;
pub mod errors;
pub mod habits;
pub mod handlers;
pub mod models;
pub mod progress;
pub mod state;
pub mod store;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use store::JsonStore;
