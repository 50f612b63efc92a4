//! The set of habits a user tracks.
//!
//! Either the fixed built-in list, or a per-user collection under
//! `users/{uid}/customHabits/{habitId}` ordered by its `order` field.

use crate::store::{
    Document, DocumentStore, StoreError, Subscription, Target, collection_path, document_path,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{collections::HashSet, str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Longest accepted label, in characters, after trimming.
pub const MAX_LABEL_LEN: usize = 50;

pub const BUILTIN_HABITS: [(&str, &str); 8] = [
    ("wake_early", "Wake up at 06:00 / 07:00"),
    ("gym", "Gym"),
    ("reading", "Reading / Learning"),
    ("budget", "Budget Tracking"),
    ("project", "Project Work"),
    ("japanese", "Japanese Language"),
    ("social_detox", "Social Media Detox"),
    ("cold_shower", "Cold Shower"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub label: String,
    pub order: u32,
}

pub fn builtin_habits() -> Vec<Habit> {
    BUILTIN_HABITS
        .iter()
        .enumerate()
        .map(|(order, (id, label))| Habit {
            id: id.to_string(),
            label: label.to_string(),
            order: order as u32,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HabitSource {
    #[default]
    Custom,
    Builtin,
}

impl FromStr for HabitSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "custom" => Ok(Self::Custom),
            "builtin" => Ok(Self::Builtin),
            other => Err(format!("unknown habit source '{other}'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum HabitError {
    #[error("habit label must not be empty")]
    EmptyLabel,
    #[error("habit label must be at most {} characters", MAX_LABEL_LEN)]
    LabelTooLong,
    #[error("habit '{0}' not found")]
    NotFound(String),
    #[error("the built-in habit list cannot be changed")]
    ReadOnly,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct HabitRegistry<S> {
    store: Arc<S>,
    source: HabitSource,
}

impl<S> Clone for HabitRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            source: self.source,
        }
    }
}

fn collection(user_id: &str) -> Result<String, StoreError> {
    collection_path(&["users", user_id, "customHabits"])
}

fn habit_path(user_id: &str, habit_id: &str) -> Result<String, StoreError> {
    document_path(&["users", user_id, "customHabits", habit_id])
}

fn clean_label(label: &str) -> Result<String, HabitError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(HabitError::EmptyLabel);
    }
    if label.chars().count() > MAX_LABEL_LEN {
        return Err(HabitError::LabelTooLong);
    }
    Ok(label.to_string())
}

fn habit_from_document(id: String, document: &Document) -> Habit {
    Habit {
        id,
        label: document
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        order: document
            .get("order")
            .and_then(Value::as_u64)
            .map_or(u32::MAX, |order| order.min(u64::from(u32::MAX)) as u32),
    }
}

fn not_found(habit_id: &str) -> impl FnOnce(StoreError) -> HabitError + '_ {
    move |err| match err {
        StoreError::NotFound(_) => HabitError::NotFound(habit_id.to_string()),
        other => HabitError::Store(other),
    }
}

impl<S: DocumentStore> HabitRegistry<S> {
    pub fn new(store: Arc<S>, source: HabitSource) -> Self {
        Self { store, source }
    }

    fn ensure_custom(&self) -> Result<(), HabitError> {
        match self.source {
            HabitSource::Custom => Ok(()),
            HabitSource::Builtin => Err(HabitError::ReadOnly),
        }
    }

    /// Habits in display order: ascending `order`, ties by id.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Habit>, HabitError> {
        if self.source == HabitSource::Builtin {
            return Ok(builtin_habits());
        }
        let mut habits: Vec<Habit> = self
            .store
            .list(&collection(user_id)?)
            .await?
            .into_iter()
            .map(|(id, document)| habit_from_document(id, &document))
            .collect();
        habits.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(habits)
    }

    /// Ids of the habits that currently exist. Completion entries for any
    /// other id belong to deleted habits.
    pub async fn valid_ids(&self, user_id: &str) -> Result<HashSet<String>, HabitError> {
        Ok(self.list(user_id).await?.into_iter().map(|habit| habit.id).collect())
    }

    pub async fn add(&self, user_id: &str, label: &str) -> Result<Habit, HabitError> {
        self.ensure_custom()?;
        let label = clean_label(label)?;
        let order = self.list(user_id).await?.len() as u32;
        let id = Uuid::new_v4().simple().to_string();

        let mut document = Document::new();
        document.insert("label".into(), json!(label));
        document.insert("order".into(), json!(order));
        document.insert("createdAt".into(), json!(Utc::now().to_rfc3339()));
        self.store.set(&habit_path(user_id, &id)?, document).await?;

        info!(user_id, habit_id = %id, "habit added");
        Ok(Habit { id, label, order })
    }

    pub async fn rename(
        &self,
        user_id: &str,
        habit_id: &str,
        label: &str,
    ) -> Result<Habit, HabitError> {
        self.ensure_custom()?;
        let label = clean_label(label)?;
        let path = habit_path(user_id, habit_id)?;
        self.store
            .update(&path, &["label"], json!(label))
            .await
            .map_err(not_found(habit_id))?;

        let document = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| HabitError::NotFound(habit_id.to_string()))?;
        info!(user_id, habit_id, "habit renamed");
        Ok(habit_from_document(habit_id.to_string(), &document))
    }

    /// Deletes the habit. Its completion history stays in the week records
    /// and is filtered out by [`HabitRegistry::valid_ids`].
    pub async fn remove(&self, user_id: &str, habit_id: &str) -> Result<(), HabitError> {
        self.ensure_custom()?;
        self.store
            .delete(&habit_path(user_id, habit_id)?)
            .await
            .map_err(not_found(habit_id))?;
        info!(user_id, habit_id, "habit removed");
        Ok(())
    }

    /// Sets each habit's `order` to its position in `habit_ids`. Every id
    /// must exist; nothing is written otherwise.
    pub async fn reorder(
        &self,
        user_id: &str,
        habit_ids: &[String],
    ) -> Result<Vec<Habit>, HabitError> {
        self.ensure_custom()?;
        if habit_ids.is_empty() {
            return self.list(user_id).await;
        }

        let known = self.valid_ids(user_id).await?;
        if let Some(missing) = habit_ids.iter().find(|id| !known.contains(*id)) {
            return Err(HabitError::NotFound(missing.clone()));
        }

        for (order, habit_id) in habit_ids.iter().enumerate() {
            self.store
                .update(&habit_path(user_id, habit_id)?, &["order"], json!(order))
                .await
                .map_err(not_found(habit_id))?;
        }
        info!(user_id, count = habit_ids.len(), "habits reordered");
        self.list(user_id).await
    }

    pub fn subscribe(&self, user_id: &str) -> Result<HabitSubscription<S>, HabitError> {
        let inner = self.store.subscribe(Target::Collection(collection(user_id)?));
        Ok(HabitSubscription {
            registry: self.clone(),
            user_id: user_id.to_string(),
            inner,
        })
    }
}

/// Ordered habit lists, delivered after every change to the user's
/// collection. The built-in list never changes, so it never yields.
pub struct HabitSubscription<S> {
    registry: HabitRegistry<S>,
    user_id: String,
    inner: Subscription,
}

impl<S: DocumentStore> HabitSubscription<S> {
    /// Lists again after any change, or after missing some.
    pub async fn next(&mut self) -> Option<Result<Vec<Habit>, HabitError>> {
        self.inner.next().await?;
        Some(self.registry.list(&self.user_id).await)
    }

    pub fn stop(self) {
        self.inner.stop();
    }
}
