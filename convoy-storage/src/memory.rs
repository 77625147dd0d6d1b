//! In-memory remote store with a server tier, a cache tier and live queries.
//!
//! Server reads warm the cache the way an offline-capable document store
//! does. Watched queries are re-evaluated on every write that touches their
//! collection and receive ADDED/MODIFIED/REMOVED diffs. Failure injection
//! hooks let tests exercise the transient-failure paths.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use convoy_core::{Document, DocumentPath, Fields, ReadMode, StoreError, StoreResult};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::traits::{
    ChangeBatch, ChangeKind, ChangeStream, DocumentChange, PageQuery, RemoteStore,
    UpdatePredicate, WriteMode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureScope {
    Read(ReadMode),
    Write,
}

#[derive(Debug)]
struct InjectedFailure {
    scope: FailureScope,
    path_prefix: String,
    error: StoreError,
}

struct Watcher {
    query: PageQuery,
    last: Vec<Document>,
    tx: mpsc::UnboundedSender<StoreResult<ChangeBatch>>,
}

#[derive(Default)]
struct Inner {
    server: BTreeMap<DocumentPath, Fields>,
    cache: BTreeMap<DocumentPath, Fields>,
    offline: bool,
    failures: VecDeque<InjectedFailure>,
    watchers: Vec<Watcher>,
}

impl Inner {
    fn take_failure(&mut self, scope: FailureScope, path: &DocumentPath) -> Option<StoreError> {
        let position = self.failures.iter().position(|f| {
            f.scope == scope && path.as_str().starts_with(f.path_prefix.as_str())
        })?;
        self.failures.remove(position).map(|f| f.error)
    }

    fn check_read(&mut self, path: &DocumentPath, mode: ReadMode) -> StoreResult<()> {
        if let Some(err) = self.take_failure(FailureScope::Read(mode), path) {
            return Err(err);
        }
        if mode.is_server() && self.offline {
            return Err(StoreError::unavailable(path.as_str(), "offline"));
        }
        Ok(())
    }

    fn check_write(&mut self, path: &DocumentPath) -> StoreResult<()> {
        match self.take_failure(FailureScope::Write, path) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn tier(&self, mode: ReadMode) -> &BTreeMap<DocumentPath, Fields> {
        match mode {
            ReadMode::Server => &self.server,
            ReadMode::Cache => &self.cache,
        }
    }

    fn apply(&mut self, path: &DocumentPath, fields: Option<Fields>) {
        match fields {
            Some(fields) => {
                self.server.insert(path.clone(), fields.clone());
                self.cache.insert(path.clone(), fields);
            }
            None => {
                self.server.remove(path);
                self.cache.remove(path);
            }
        }
        if let Some(collection) = path.parent() {
            self.notify(&collection);
        }
    }

    /// Re-evaluate every watcher on `collection` and push the diff.
    fn notify(&mut self, collection: &DocumentPath) {
        let server = &self.server;
        self.watchers.retain_mut(|watcher| {
            if &watcher.query.collection != collection {
                return !watcher.tx.is_closed();
            }
            let documents = run_query(server, &watcher.query);
            let changes = diff(&watcher.last, &documents);
            if changes.is_empty() {
                return !watcher.tx.is_closed();
            }
            watcher.last = documents.clone();
            watcher
                .tx
                .send(Ok(ChangeBatch { documents, changes }))
                .is_ok()
        });
    }
}

fn children(tier: &BTreeMap<DocumentPath, Fields>, collection: &DocumentPath) -> Vec<Document> {
    tier.iter()
        .filter(|(path, _)| path.is_child_of(collection))
        .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
        .collect()
}

fn order_value(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(i64::MIN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(i64::MIN),
        _ => i64::MIN,
    }
}

/// Evaluate a page query. Documents without the order field are excluded.
fn run_query(tier: &BTreeMap<DocumentPath, Fields>, query: &PageQuery) -> Vec<Document> {
    let key_of = |doc: &Document| (order_value(doc.get(&query.order_by)), doc.path.clone());

    let mut docs: Vec<Document> = children(tier, &query.collection)
        .into_iter()
        .filter(|doc| doc.get(&query.order_by).is_some())
        .collect();
    docs.sort_by(|a, b| {
        let ordering = key_of(a).cmp(&key_of(b));
        if query.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    if let Some(cursor) = &query.start_after {
        let cursor_key = key_of(cursor);
        docs.retain(|doc| {
            let key = key_of(doc);
            if query.descending {
                key < cursor_key
            } else {
                key > cursor_key
            }
        });
    }

    docs.truncate(query.limit);
    docs
}

fn diff(previous: &[Document], current: &[Document]) -> Vec<DocumentChange> {
    let before: HashMap<&DocumentPath, &Document> =
        previous.iter().map(|doc| (&doc.path, doc)).collect();
    let after: HashMap<&DocumentPath, &Document> =
        current.iter().map(|doc| (&doc.path, doc)).collect();

    let mut changes = Vec::new();
    for doc in current {
        match before.get(&doc.path) {
            None => changes.push(DocumentChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            }),
            Some(old) if old.fields != doc.fields => changes.push(DocumentChange {
                kind: ChangeKind::Modified,
                document: doc.clone(),
            }),
            Some(_) => {}
        }
    }
    for doc in previous {
        if !after.contains_key(&doc.path) {
            changes.push(DocumentChange {
                kind: ChangeKind::Removed,
                document: doc.clone(),
            });
        }
    }
    changes
}

/// In-memory [`RemoteStore`].
#[derive(Default)]
pub struct InMemoryRemoteStore {
    inner: Mutex<Inner>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a document on the server and in the cache, notifying watchers.
    pub fn seed(&self, doc: Document) {
        self.lock().apply(&doc.path, Some(doc.fields));
    }

    /// Put a document on the server only; the cache stays cold.
    pub fn seed_server(&self, doc: Document) {
        let mut inner = self.lock();
        inner.server.insert(doc.path.clone(), doc.fields);
        if let Some(collection) = doc.path.parent() {
            inner.notify(&collection);
        }
    }

    /// Drop every cached document whose path starts with `prefix`.
    pub fn evict_cache(&self, prefix: &str) {
        self.lock()
            .cache
            .retain(|path, _| !path.as_str().starts_with(prefix));
    }

    /// While offline every server read fails with a transient error.
    pub fn set_online(&self, online: bool) {
        self.lock().offline = !online;
    }

    /// Fail the next `mode` read under `path_prefix` with `error`.
    pub fn fail_next(&self, mode: ReadMode, path_prefix: &str, error: StoreError) {
        self.lock().failures.push_back(InjectedFailure {
            scope: FailureScope::Read(mode),
            path_prefix: path_prefix.to_string(),
            error,
        });
    }

    /// Fail the next write, update or delete under `path_prefix` with `error`.
    pub fn fail_next_write(&self, path_prefix: &str, error: StoreError) {
        self.lock().failures.push_back(InjectedFailure {
            scope: FailureScope::Write,
            path_prefix: path_prefix.to_string(),
            error,
        });
    }

    /// Push an error to every watcher of `collection`.
    pub fn fail_watchers(&self, collection: &DocumentPath, error: StoreError) {
        let inner = self.lock();
        for watcher in inner
            .watchers
            .iter()
            .filter(|w| &w.query.collection == collection)
        {
            let _ = watcher.tx.send(Err(error.clone()));
        }
    }

    pub fn server_document(&self, path: &DocumentPath) -> Option<Document> {
        self.lock()
            .server
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone()))
    }

    pub fn cache_document(&self, path: &DocumentPath) -> Option<Document> {
        self.lock()
            .cache
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone()))
    }

    /// Watchers whose receiver is still alive.
    pub fn active_watchers(&self) -> usize {
        self.lock()
            .watchers
            .iter()
            .filter(|w| !w.tx.is_closed())
            .count()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn read_document(
        &self,
        path: &DocumentPath,
        mode: ReadMode,
    ) -> StoreResult<Option<Document>> {
        let mut inner = self.lock();
        inner.check_read(path, mode)?;
        let fields = inner.tier(mode).get(path).cloned();
        if mode.is_server() {
            match &fields {
                Some(fields) => {
                    inner.cache.insert(path.clone(), fields.clone());
                }
                None => {
                    inner.cache.remove(path);
                }
            }
        }
        Ok(fields.map(|fields| Document::new(path.clone(), fields)))
    }

    async fn read_collection(
        &self,
        path: &DocumentPath,
        mode: ReadMode,
    ) -> StoreResult<Vec<Document>> {
        let mut inner = self.lock();
        inner.check_read(path, mode)?;
        let docs = children(inner.tier(mode), path);
        if mode.is_server() {
            inner.cache.retain(|cached, _| !cached.is_child_of(path));
            for doc in &docs {
                inner.cache.insert(doc.path.clone(), doc.fields.clone());
            }
        }
        debug!(path = %path, mode = %mode, count = docs.len(), "in-memory collection read");
        Ok(docs)
    }

    async fn is_cache_empty(&self, path: &DocumentPath) -> bool {
        let inner = self.lock();
        if path.is_collection() {
            !inner.cache.keys().any(|cached| cached.is_child_of(path))
        } else {
            !inner.cache.contains_key(path)
        }
    }

    async fn watch(&self, query: PageQuery) -> StoreResult<ChangeStream> {
        let mut inner = self.lock();
        let mode = if inner.offline {
            ReadMode::Cache
        } else {
            ReadMode::Server
        };
        inner.check_read(&query.collection, mode)?;

        let documents = run_query(inner.tier(mode), &query);
        let changes = documents
            .iter()
            .map(|doc| DocumentChange {
                kind: ChangeKind::Added,
                document: doc.clone(),
            })
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so the initial send cannot fail.
        let _ = tx.send(Ok(ChangeBatch {
            documents: documents.clone(),
            changes,
        }));
        inner.watchers.push(Watcher {
            query,
            last: documents,
            tx,
        });
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn write(&self, path: &DocumentPath, fields: Fields, mode: WriteMode) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.check_write(path)?;
        let merged = match (mode, inner.server.get(path)) {
            (WriteMode::Merge, Some(existing)) => {
                let mut merged = existing.clone();
                merged.extend(fields);
                merged
            }
            _ => fields,
        };
        inner.apply(path, Some(merged));
        Ok(())
    }

    async fn create(&self, path: &DocumentPath, fields: Fields) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.check_write(path)?;
        if inner.server.contains_key(path) {
            return Ok(false);
        }
        inner.apply(path, Some(fields));
        Ok(true)
    }

    async fn conditional_update(
        &self,
        path: &DocumentPath,
        field: &str,
        predicate: UpdatePredicate,
        new_value: Value,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        inner.check_write(path)?;
        let Some(existing) = inner.server.get(path) else {
            return Err(StoreError::not_found(path.as_str()));
        };
        if !predicate.holds(existing.get(field)) {
            return Ok(false);
        }
        let mut updated = existing.clone();
        updated.insert(field.to_string(), new_value);
        inner.apply(path, Some(updated));
        Ok(true)
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.check_write(path)?;
        inner.apply(path, None);
        Ok(())
    }
}
