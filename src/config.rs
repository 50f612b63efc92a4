use crate::habits::HabitSource;
use std::{env, path::PathBuf};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/state.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_HABIT_SOURCE: {0}")]
    HabitSource(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub habit_source: HabitSource,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let habit_source = match env::var("APP_HABIT_SOURCE") {
            Ok(value) => value.parse().map_err(ConfigError::HabitSource)?,
            Err(_) => HabitSource::default(),
        };

        Ok(Self {
            port,
            data_path: resolve_data_path(),
            habit_source,
        })
    }
}

pub fn resolve_data_path() -> PathBuf {
    if let Ok(path) = env::var("APP_DATA_PATH") {
        return PathBuf::from(path);
    }

    PathBuf::from(DEFAULT_DATA_PATH)
}
