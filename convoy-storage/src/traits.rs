//! Remote store capability consumed by the sync engine.
//!
//! The document store itself (query engine, offline cache, conflict
//! resolution) lives outside this workspace. These traits describe the
//! slice of it the engine needs: mode-selected reads, bounded change
//! streams, merge/set writes and conditional field updates.

use async_trait::async_trait;
use convoy_core::{Document, DocumentPath, Fields, ReadMode, StoreResult};
use futures_util::stream::BoxStream;
use serde_json::Value;

/// How a write combines with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep fields not present in the write.
    Merge,
    /// Replace the whole document.
    Set,
}

/// Guard for a conditional single-field update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePredicate {
    /// Field missing, null, `false` or `0`.
    AbsentOrFalse,
    Always,
}

impl UpdatePredicate {
    pub fn holds(self, current: Option<&Value>) -> bool {
        match self {
            Self::Always => true,
            Self::AbsentOrFalse => match current {
                None | Some(Value::Null) | Some(Value::Bool(false)) => true,
                Some(Value::Number(n)) => n.as_i64() == Some(0),
                Some(_) => false,
            },
        }
    }
}

/// A bounded, ordered query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub collection: DocumentPath,
    pub order_by: String,
    pub descending: bool,
    pub limit: usize,
    /// Resume strictly after this document in query order.
    pub start_after: Option<Document>,
}

impl PageQuery {
    /// Newest-first page over `collection` ordered by `order_by`.
    pub fn newest_first(collection: DocumentPath, order_by: impl Into<String>, limit: usize) -> Self {
        Self {
            collection,
            order_by: order_by.into(),
            descending: true,
            limit,
            start_after: None,
        }
    }

    pub fn start_after(mut self, cursor: Option<Document>) -> Self {
        self.start_after = cursor;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub document: Document,
}

/// One delivery of a change stream: the query's full current result plus
/// the changes since the previous delivery.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeBatch {
    pub documents: Vec<Document>,
    pub changes: Vec<DocumentChange>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn last_document(&self) -> Option<&Document> {
        self.documents.last()
    }
}

/// Live stream of batches for one query. Ends when the store drops the watch.
pub type ChangeStream = BoxStream<'static, StoreResult<ChangeBatch>>;

/// Remote document store adapter.
///
/// Implementations must be cheap to share behind an `Arc`; every method may
/// be called concurrently from several screens.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Read one document. `Ok(None)` when it does not exist.
    async fn read_document(
        &self,
        path: &DocumentPath,
        mode: ReadMode,
    ) -> StoreResult<Option<Document>>;

    /// Read every document directly inside a collection.
    async fn read_collection(
        &self,
        path: &DocumentPath,
        mode: ReadMode,
    ) -> StoreResult<Vec<Document>>;

    /// True when the local cache holds nothing for `path`.
    async fn is_cache_empty(&self, path: &DocumentPath) -> bool;

    /// Subscribe to a bounded query.
    async fn watch(&self, query: PageQuery) -> StoreResult<ChangeStream>;

    async fn write(&self, path: &DocumentPath, fields: Fields, mode: WriteMode) -> StoreResult<()>;

    /// Create `path` only if no document exists there yet. Returns whether
    /// this call created it.
    async fn create(&self, path: &DocumentPath, fields: Fields) -> StoreResult<bool>;

    /// Set `field` to `new_value` only if `predicate` holds for its current
    /// value. Returns whether the update was applied; `NotFound` when the
    /// document does not exist.
    async fn conditional_update(
        &self,
        path: &DocumentPath,
        field: &str,
        predicate: UpdatePredicate,
        new_value: Value,
    ) -> StoreResult<bool>;

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()>;
}
