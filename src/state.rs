use crate::completion::CompletionStore;
use crate::habits::{HabitRegistry, HabitSource};
use crate::store::JsonStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JsonStore>,
    pub habits: HabitRegistry<JsonStore>,
    pub completions: Arc<CompletionStore<JsonStore>>,
}

impl AppState {
    pub fn new(store: JsonStore, habit_source: HabitSource) -> Self {
        let store = Arc::new(store);
        Self {
            habits: HabitRegistry::new(Arc::clone(&store), habit_source),
            completions: Arc::new(CompletionStore::new(Arc::clone(&store))),
            store,
        }
    }
}
