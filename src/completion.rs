//! Per-week completion records and the adapter that reads and toggles them.
//!
//! A record lives at `users/{uid}/habits/{year}/months/{monthId}/weeks/{weekId}`
//! and maps day ids to habit ids to booleans. Records are created on the
//! first toggle of a week; until then the week reads as all-false.

use crate::calendar::{self, WeekDescriptor};
use crate::store::{
    Document, DocumentStore, Notice, StoreError, Subscription, Target, document_path,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, PoisonError, RwLock, Weak},
};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionRecord {
    days: BTreeMap<String, BTreeMap<String, bool>>,
}

impl CompletionRecord {
    /// Reads a stored document, dropping anything that is not a
    /// day → habit → bool entry.
    pub fn from_document(document: &Document) -> Self {
        let days = document
            .iter()
            .filter_map(|(day, value)| {
                let entries: BTreeMap<String, bool> = value
                    .as_object()?
                    .iter()
                    .filter_map(|(habit, done)| Some((habit.clone(), done.as_bool()?)))
                    .collect();
                Some((day.clone(), entries))
            })
            .collect();
        Self { days }
    }

    pub fn is_completed(&self, day_id: &str, habit_id: &str) -> bool {
        self.days
            .get(day_id)
            .and_then(|entries| entries.get(habit_id))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, day_id: &str, habit_id: &str, done: bool) {
        self.days
            .entry(day_id.to_string())
            .or_default()
            .insert(habit_id.to_string(), done);
    }

    pub fn day(&self, day_id: &str) -> Option<&BTreeMap<String, bool>> {
        self.days.get(day_id)
    }

    pub fn days(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, bool>)> {
        self.days.iter().map(|(day, entries)| (day.as_str(), entries))
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Identifies one week record: the month it is listed under and its
/// `week-{n}` id within that month.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeekKey {
    pub user_id: String,
    pub year: i32,
    pub month_id: String,
    pub week_id: String,
}

impl WeekKey {
    pub fn new(user_id: impl Into<String>, month: NaiveDate, week_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            year: month.year(),
            month_id: calendar::month_id(month),
            week_id: week_id.into(),
        }
    }

    pub fn path(&self) -> Result<String, StoreError> {
        document_path(&[
            "users",
            &self.user_id,
            "habits",
            &self.year.to_string(),
            "months",
            &self.month_id,
            "weeks",
            &self.week_id,
        ])
    }
}

/// In-memory copy of one week record. Reads never wait on persistence;
/// toggles are applied here first and rolled back if the write fails.
pub struct WeekView {
    key: WeekKey,
    record: RwLock<CompletionRecord>,
    toggles: tokio::sync::Mutex<()>,
}

impl WeekView {
    fn new(key: WeekKey, record: CompletionRecord) -> Self {
        Self {
            key,
            record: RwLock::new(record),
            toggles: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &WeekKey {
        &self.key
    }

    pub fn snapshot(&self) -> CompletionRecord {
        self.record.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_completed(&self, day_id: &str, habit_id: &str) -> bool {
        self.record
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_completed(day_id, habit_id)
    }

    fn apply(&self, day_id: &str, habit_id: &str, done: bool) {
        self.record
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(day_id, habit_id, done);
    }
}

fn record_of(document: Option<Document>) -> CompletionRecord {
    document
        .map(|document| CompletionRecord::from_document(&document))
        .unwrap_or_default()
}

/// Record snapshots for one week, delivered after every persisted change.
/// A subscriber that falls behind gets the current stored record instead of
/// the changes it missed.
pub struct RecordSubscription<S> {
    store: Arc<S>,
    path: String,
    inner: Subscription,
}

impl<S: DocumentStore> RecordSubscription<S> {
    pub async fn next(&mut self) -> Option<Result<CompletionRecord, StoreError>> {
        match self.inner.next().await? {
            Notice::Changed(change) => Some(Ok(record_of(change.document))),
            Notice::Lagged => Some(self.store.get(&self.path).await.map(record_of)),
        }
    }

    pub fn stop(self) {
        self.inner.stop();
    }
}

pub struct CompletionStore<S> {
    store: Arc<S>,
    /// Views currently held by a caller. Entries die with their last
    /// handle and are pruned on the next insert.
    views: Mutex<HashMap<WeekKey, Weak<WeekView>>>,
}

impl<S: DocumentStore> CompletionStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Reads the stored record; a week that was never toggled is empty.
    pub async fn load(&self, key: &WeekKey) -> Result<CompletionRecord, StoreError> {
        let document = self.store.get(&key.path()?).await?;
        Ok(record_of(document))
    }

    /// The shared view for `key`. Callers holding a view at the same time
    /// get the same one; a view nobody holds is reloaded from the store.
    pub async fn view(&self, key: &WeekKey) -> Result<Arc<WeekView>, StoreError> {
        if let Some(view) = self.cached(key) {
            return Ok(view);
        }
        let record = self.load(key).await?;
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(view) = views.get(key).and_then(Weak::upgrade) {
            return Ok(view);
        }
        views.retain(|_, view| view.strong_count() > 0);
        let view = Arc::new(WeekView::new(key.clone(), record));
        views.insert(key.clone(), Arc::downgrade(&view));
        Ok(view)
    }

    fn cached(&self, key: &WeekKey) -> Option<Arc<WeekView>> {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(Weak::upgrade)
    }

    /// The live view's record if one is held, including toggles still being
    /// written; otherwise the stored record. Never creates a view.
    pub async fn snapshot(&self, key: &WeekKey) -> Result<CompletionRecord, StoreError> {
        match self.cached(key) {
            Some(view) => Ok(view.snapshot()),
            None => self.load(key).await,
        }
    }

    /// Records for every week of the month containing `month`, in week order.
    pub async fn load_month(
        &self,
        user_id: &str,
        month: NaiveDate,
    ) -> Result<Vec<(WeekDescriptor, CompletionRecord)>, StoreError> {
        let mut weeks = Vec::new();
        for week in calendar::weeks_in_month(month) {
            let key = WeekKey::new(user_id, month, &week.id);
            let record = self.snapshot(&key).await?;
            weeks.push((week, record));
        }
        Ok(weeks)
    }

    /// Flips `[day_id][habit_id]` and returns the new value.
    ///
    /// The view shows the new value before the write completes. If the write
    /// fails the leaf is restored and the error returned. Toggles on one view
    /// run one at a time, so a revert never clobbers a later toggle.
    pub async fn toggle(
        &self,
        view: &WeekView,
        day_id: &str,
        habit_id: &str,
    ) -> Result<bool, StoreError> {
        let _serial = view.toggles.lock().await;

        let previous = view.is_completed(day_id, habit_id);
        let next = !previous;
        view.apply(day_id, habit_id, next);

        if let Err(err) = self.persist(view.key(), day_id, habit_id, next).await {
            warn!(
                path = ?view.key().path().ok(),
                day_id,
                habit_id,
                "toggle failed, reverting: {err}"
            );
            view.apply(day_id, habit_id, previous);
            return Err(err);
        }

        info!(user_id = %view.key().user_id, day_id, habit_id, done = next, "habit toggled");
        Ok(next)
    }

    async fn persist(
        &self,
        key: &WeekKey,
        day_id: &str,
        habit_id: &str,
        done: bool,
    ) -> Result<(), StoreError> {
        let path = key.path()?;
        if self.store.get(&path).await?.is_some() {
            return self.store.update(&path, &[day_id, habit_id], Value::Bool(done)).await;
        }

        let mut entries = Map::new();
        entries.insert(habit_id.to_string(), Value::Bool(done));
        let mut document = Document::new();
        document.insert(day_id.to_string(), Value::Object(entries));
        self.store.set(&path, document).await
    }

    pub fn subscribe(&self, key: &WeekKey) -> Result<RecordSubscription<S>, StoreError> {
        let path = key.path()?;
        let inner = self.store.subscribe(Target::Document(path.clone()));
        Ok(RecordSubscription {
            store: Arc::clone(&self.store),
            path,
            inner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Wraps an in-memory store with switchable write failures and an
    /// optional gate that holds writes until released.
    struct TestStore {
        inner: JsonStore,
        fail_writes: AtomicBool,
        gated: AtomicBool,
        release: Notify,
    }

    impl TestStore {
        fn new() -> Self {
            Self {
                inner: JsonStore::in_memory(),
                fail_writes: AtomicBool::new(false),
                gated: AtomicBool::new(false),
                release: Notify::new(),
            }
        }

        async fn before_write(&self) -> Result<(), StoreError> {
            if self.gated.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("quota exceeded")));
            }
            Ok(())
        }
    }

    impl DocumentStore for TestStore {
        async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
            self.inner.get(path).await
        }

        async fn set(&self, path: &str, document: Document) -> Result<(), StoreError> {
            self.before_write().await?;
            self.inner.set(path, document).await
        }

        async fn update(
            &self,
            path: &str,
            field: &[&str],
            value: Value,
        ) -> Result<(), StoreError> {
            self.before_write().await?;
            self.inner.update(path, field, value).await
        }

        async fn delete(&self, path: &str) -> Result<(), StoreError> {
            self.before_write().await?;
            self.inner.delete(path).await
        }

        async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
            self.inner.list(collection).await
        }

        fn subscribe(&self, target: Target) -> Subscription {
            self.inner.subscribe(target)
        }
    }

    fn june_week(week_id: &str) -> WeekKey {
        WeekKey::new("u1", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), week_id)
    }

    #[test]
    fn week_key_path_uses_month_and_week_ids() {
        assert_eq!(
            june_week("week-1").path().unwrap(),
            "users/u1/habits/2024/months/2024-06/weeks/week-1"
        );
    }

    #[test]
    fn malformed_entries_read_as_not_completed() {
        let document = match json!({
            "2024-06-03": { "gym": true, "reading": "yes", "budget": null },
            "2024-06-04": 7,
            "2024-06-05": { "gym": false }
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let record = CompletionRecord::from_document(&document);
        assert!(record.is_completed("2024-06-03", "gym"));
        assert!(!record.is_completed("2024-06-03", "reading"));
        assert!(!record.is_completed("2024-06-04", "gym"));
        assert!(!record.is_completed("2024-06-09", "gym"));
        assert_eq!(record.day("2024-06-03").map(|day| day.len()), Some(1));
    }

    #[tokio::test]
    async fn missing_record_loads_empty() {
        let completions = CompletionStore::new(Arc::new(JsonStore::in_memory()));
        let record = completions.load(&june_week("week-2")).await.unwrap();
        assert!(record.is_empty());
    }

    #[tokio::test]
    async fn first_toggle_creates_record_with_single_entry() {
        let store = Arc::new(JsonStore::in_memory());
        let completions = CompletionStore::new(Arc::clone(&store));
        let key = june_week("week-2");
        let view = completions.view(&key).await.unwrap();

        assert!(completions.toggle(&view, "2024-06-03", "gym").await.unwrap());

        let stored = store.get(&key.path().unwrap()).await.unwrap().unwrap();
        assert_eq!(Value::Object(stored), json!({ "2024-06-03": { "gym": true } }));
    }

    #[tokio::test]
    async fn later_toggles_patch_without_clobbering_siblings() {
        let store = Arc::new(JsonStore::in_memory());
        let completions = CompletionStore::new(Arc::clone(&store));
        let key = june_week("week-2");
        let view = completions.view(&key).await.unwrap();

        completions.toggle(&view, "2024-06-03", "gym").await.unwrap();
        completions.toggle(&view, "2024-06-03", "reading").await.unwrap();
        completions.toggle(&view, "2024-06-04", "gym").await.unwrap();
        completions.toggle(&view, "2024-06-03", "gym").await.unwrap();

        let loaded = completions.load(&key).await.unwrap();
        assert!(!loaded.is_completed("2024-06-03", "gym"));
        assert!(loaded.is_completed("2024-06-03", "reading"));
        assert!(loaded.is_completed("2024-06-04", "gym"));
        assert_eq!(loaded, view.snapshot());
    }

    #[tokio::test]
    async fn toggling_twice_restores_original_value() {
        let completions = CompletionStore::new(Arc::new(JsonStore::in_memory()));
        let view = completions.view(&june_week("week-3")).await.unwrap();

        let before = view.snapshot().is_completed("2024-06-10", "gym");
        completions.toggle(&view, "2024-06-10", "gym").await.unwrap();
        completions.toggle(&view, "2024-06-10", "gym").await.unwrap();
        assert_eq!(view.is_completed("2024-06-10", "gym"), before);
    }

    #[tokio::test]
    async fn failed_write_reverts_optimistic_value() {
        let store = Arc::new(TestStore::new());
        let completions = CompletionStore::new(Arc::clone(&store));
        let key = june_week("week-2");
        let view = completions.view(&key).await.unwrap();

        completions.toggle(&view, "2024-06-03", "gym").await.unwrap();
        store.fail_writes.store(true, Ordering::SeqCst);

        let err = completions.toggle(&view, "2024-06-03", "gym").await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(view.is_completed("2024-06-03", "gym"));

        let err = completions.toggle(&view, "2024-06-04", "reading").await;
        assert!(err.is_err());
        assert!(!view.is_completed("2024-06-04", "reading"));
        assert!(completions.load(&key).await.unwrap().is_completed("2024-06-03", "gym"));
    }

    #[tokio::test]
    async fn optimistic_value_is_visible_before_write_completes() {
        let store = Arc::new(TestStore::new());
        store.gated.store(true, Ordering::SeqCst);
        let completions = Arc::new(CompletionStore::new(Arc::clone(&store)));
        let view = completions.view(&june_week("week-2")).await.unwrap();

        let task = {
            let completions = Arc::clone(&completions);
            let view = Arc::clone(&view);
            tokio::spawn(async move { completions.toggle(&view, "2024-06-05", "gym").await })
        };

        while !view.is_completed("2024-06-05", "gym") {
            tokio::task::yield_now().await;
        }
        assert!(completions.load(view.key()).await.unwrap().is_empty());

        store.release.notify_one();
        assert!(task.await.unwrap().unwrap());
        assert!(completions.load(view.key()).await.unwrap().is_completed("2024-06-05", "gym"));
    }

    #[tokio::test]
    async fn views_are_shared_per_week() {
        let completions = CompletionStore::new(Arc::new(JsonStore::in_memory()));
        let first = completions.view(&june_week("week-1")).await.unwrap();
        let again = completions.view(&june_week("week-1")).await.unwrap();
        let other = completions.view(&june_week("week-2")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn released_views_are_not_retained() {
        let completions = CompletionStore::new(Arc::new(JsonStore::in_memory()));
        let june = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        for n in 0..50 {
            completions.load_month(&format!("user{n}"), june).await.unwrap();
        }
        assert!(completions.views.lock().unwrap().is_empty());

        let view = completions.view(&june_week("week-1")).await.unwrap();
        drop(view);
        let kept = completions.view(&june_week("week-2")).await.unwrap();
        let views = completions.views.lock().unwrap();
        assert_eq!(views.len(), 1);
        assert!(views.contains_key(kept.key()));
    }

    #[tokio::test]
    async fn snapshot_reflects_a_held_view() {
        let store = Arc::new(TestStore::new());
        store.gated.store(true, Ordering::SeqCst);
        let completions = Arc::new(CompletionStore::new(Arc::clone(&store)));
        let key = june_week("week-2");
        let view = completions.view(&key).await.unwrap();

        let task = {
            let completions = Arc::clone(&completions);
            let view = Arc::clone(&view);
            tokio::spawn(async move { completions.toggle(&view, "2024-06-05", "gym").await })
        };
        while !view.is_completed("2024-06-05", "gym") {
            tokio::task::yield_now().await;
        }

        let snapshot = completions.snapshot(&key).await.unwrap();
        assert!(snapshot.is_completed("2024-06-05", "gym"));
        store.release.notify_one();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn subscription_delivers_snapshots_until_stopped() {
        let completions = CompletionStore::new(Arc::new(JsonStore::in_memory()));
        let key = june_week("week-2");
        let mut subscription = completions.subscribe(&key).unwrap();
        let view = completions.view(&key).await.unwrap();

        completions.toggle(&view, "2024-06-03", "gym").await.unwrap();
        completions.toggle(&view, "2024-06-03", "reading").await.unwrap();

        let first = subscription.next().await.unwrap().unwrap();
        assert!(first.is_completed("2024-06-03", "gym"));
        assert!(!first.is_completed("2024-06-03", "reading"));
        let second = subscription.next().await.unwrap().unwrap();
        assert!(second.is_completed("2024-06-03", "reading"));
        subscription.stop();
    }

    #[tokio::test]
    async fn lagging_subscription_resumes_with_current_record() {
        let store = Arc::new(JsonStore::in_memory());
        let completions = CompletionStore::new(Arc::clone(&store));
        let key = june_week("week-2");
        let mut subscription = completions.subscribe(&key).unwrap();
        let view = completions.view(&key).await.unwrap();

        completions.toggle(&view, "2024-06-03", "gym").await.unwrap();
        for n in 0..300 {
            store.set(&format!("users/u{n}"), Document::new()).await.unwrap();
        }

        let record = tokio::time::timeout(Duration::from_secs(2), subscription.next())
            .await
            .expect("subscription stalled after lagging")
            .unwrap()
            .unwrap();
        assert!(record.is_completed("2024-06-03", "gym"));
    }

    #[tokio::test]
    async fn load_month_returns_every_week() {
        let completions = CompletionStore::new(Arc::new(JsonStore::in_memory()));
        let june = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let weeks = completions.load_month("u1", june).await.unwrap();
        assert_eq!(weeks.len(), 6);
        assert_eq!(weeks[0].0.id, "week-1");
        assert!(weeks.iter().all(|(_, record)| record.is_empty()));
    }
}
