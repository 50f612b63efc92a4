//! Document storage collaborator.
//!
//! Documents are JSON objects addressed by slash-separated paths that
//! alternate collection and document segments
//! (`users/{uid}/customHabits/{id}`). [`DocumentStore`] is the contract the
//! rest of the crate depends on; [`JsonStore`] keeps every document in memory
//! and rewrites a single JSON file after each mutation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs,
    sync::{Mutex, broadcast, broadcast::error::RecvError},
};
use tracing::{error, warn};

pub type Document = Map<String, Value>;

const CHANGE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A persisted mutation. `document` is `None` after a delete.
#[derive(Debug, Clone)]
pub struct Change {
    pub path: String,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Document(String),
    Collection(String),
}

impl Target {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Target::Document(target) => target == path,
            Target::Collection(collection) => path
                .strip_prefix(collection.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|id| !id.is_empty() && !id.contains('/')),
        }
    }
}

/// What a [`Subscription`] observed.
#[derive(Debug, Clone)]
pub enum Notice {
    Changed(Change),
    /// Notifications were dropped because the subscriber fell behind; the
    /// target may have changed and must be re-read.
    Lagged,
}

/// Live feed of changes under one [`Target`]. Dropping it (or calling
/// [`Subscription::stop`]) unsubscribes.
pub struct Subscription {
    target: Target,
    receiver: broadcast::Receiver<Change>,
}

impl Subscription {
    /// Waits for the next change under the target. Returns `None` once the
    /// store has gone away.
    pub async fn next(&mut self) -> Option<Notice> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if self.target.matches(&change.path) => {
                    return Some(Notice::Changed(change));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(subscription = ?self.target, skipped, "subscriber lagged");
                    return Some(Notice::Lagged);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn stop(self) {}
}

pub trait DocumentStore: Send + Sync {
    fn get(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Creates the document, replacing any existing one.
    fn set(
        &self,
        path: &str,
        document: Document,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Patches a single nested field of an existing document, creating
    /// intermediate objects as needed. Sibling fields are left untouched.
    fn update(
        &self,
        path: &str,
        field: &[&str],
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete(&self, path: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Direct children of a collection as `(id, document)` pairs, sorted by id.
    fn list(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<Vec<(String, Document)>, StoreError>> + Send;

    fn subscribe(&self, target: Target) -> Subscription;
}

pub fn document_path(segments: &[&str]) -> Result<String, StoreError> {
    join_path(segments, 0)
}

pub fn collection_path(segments: &[&str]) -> Result<String, StoreError> {
    join_path(segments, 1)
}

fn join_path(segments: &[&str], parity: usize) -> Result<String, StoreError> {
    let joined = segments.join("/");
    let valid = segments.len() % 2 == parity
        && !segments.is_empty()
        && segments.iter().all(|segment| !segment.is_empty() && !segment.contains('/'));
    if valid { Ok(joined) } else { Err(StoreError::InvalidPath(joined)) }
}

fn check_document_path(path: &str) -> Result<(), StoreError> {
    let segments: Vec<&str> = path.split('/').collect();
    document_path(&segments).map(|_| ())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    documents: BTreeMap<String, Document>,
}

pub struct JsonStore {
    path: Option<PathBuf>,
    documents: Mutex<BTreeMap<String, Document>>,
    changes: broadcast::Sender<Change>,
}

impl JsonStore {
    /// Opens the store backed by `path`. A missing file yields an empty
    /// store; an unreadable or corrupt one is an error so it is never
    /// overwritten.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = load_data(&path).await?;
        Ok(Self::with_documents(Some(path), data.documents))
    }

    pub fn in_memory() -> Self {
        Self::with_documents(None, BTreeMap::new())
    }

    fn with_documents(path: Option<PathBuf>, documents: BTreeMap<String, Document>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            path,
            documents: Mutex::new(documents),
            changes,
        }
    }

    async fn persist(&self, documents: &BTreeMap<String, Document>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let payload = serde_json::to_vec_pretty(&StoreDataRef { documents })?;
        let staging = staging_path(path);
        fs::write(&staging, payload).await?;
        fs::rename(&staging, path).await?;
        Ok(())
    }

    /// Applies `mutate` to the document at `path`, persists, and rolls the
    /// in-memory copy back if persisting fails.
    async fn commit<F>(&self, path: &str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(Option<Document>) -> Result<Option<Document>, StoreError>,
    {
        check_document_path(path)?;
        let mut documents = self.documents.lock().await;
        let previous = documents.get(path).cloned();
        let next = mutate(previous.clone())?;

        match &next {
            Some(document) => documents.insert(path.to_string(), document.clone()),
            None => documents.remove(path),
        };

        if let Err(err) = self.persist(&documents).await {
            error!(path, "failed to persist store: {err}");
            match previous {
                Some(document) => documents.insert(path.to_string(), document),
                None => documents.remove(path),
            };
            return Err(err);
        }

        // No receivers is fine.
        let _ = self.changes.send(Change {
            path: path.to_string(),
            document: next,
        });
        Ok(())
    }
}

#[derive(Serialize)]
struct StoreDataRef<'a> {
    documents: &'a BTreeMap<String, Document>,
}

impl DocumentStore for JsonStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        check_document_path(path)?;
        Ok(self.documents.lock().await.get(path).cloned())
    }

    async fn set(&self, path: &str, document: Document) -> Result<(), StoreError> {
        self.commit(path, |_| Ok(Some(document))).await
    }

    async fn update(&self, path: &str, field: &[&str], value: Value) -> Result<(), StoreError> {
        let Some((leaf, parents)) = field.split_last() else {
            return Err(StoreError::InvalidPath(format!("{path}#")));
        };
        self.commit(path, |current| {
            let mut document = current.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            let mut node = &mut document;
            for segment in parents {
                let child = node
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !child.is_object() {
                    *child = Value::Object(Map::new());
                }
                let Value::Object(map) = child else {
                    return Err(StoreError::InvalidPath(path.to_string()));
                };
                node = map;
            }
            node.insert(leaf.to_string(), value);
            Ok(Some(document))
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.commit(path, |current| match current {
            Some(_) => Ok(None),
            None => Err(StoreError::NotFound(path.to_string())),
        })
        .await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let segments: Vec<&str> = collection.split('/').collect();
        collection_path(&segments)?;
        let target = Target::Collection(collection.to_string());
        let documents = self.documents.lock().await;
        Ok(documents
            .iter()
            .filter(|(path, _)| target.matches(path))
            .map(|(path, document)| {
                let id = path.rsplit('/').next().unwrap_or_default().to_string();
                (id, document.clone())
            })
            .collect())
    }

    fn subscribe(&self, target: Target) -> Subscription {
        Subscription {
            target,
            receiver: self.changes.subscribe(),
        }
    }
}

/// The file is replaced by renaming this sibling over it, so a crash
/// mid-write never leaves a truncated store behind.
fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    PathBuf::from(staging)
}

async fn load_data(path: &Path) -> Result<StoreData, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
            error!(path = %path.display(), "failed to parse data file: {err}");
            StoreError::Serialization(err)
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StoreData::default()),
        Err(err) => {
            error!(path = %path.display(), "failed to read data file: {err}");
            Err(StoreError::Io(err))
        }
    }
}
