//! Merge state of one aggregator: records ordered newest-first, the cursor
//! for the next page and the end-of-data sentinel.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use convoy_core::decode::decode_message;
use convoy_core::{Document, DocumentPath, MessageFolder, MessageRecord};
use convoy_storage::{ChangeBatch, ChangeKind};
use tracing::warn;

/// What applying one batch did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Records added or replaced, in batch order.
    pub upserted: Vec<MessageRecord>,
    pub removed: usize,
    /// Documents dropped because their identity key did not parse.
    pub malformed: usize,
}

#[derive(Debug, Clone)]
pub struct PageState {
    folder: MessageFolder,
    records: BTreeMap<Reverse<i64>, MessageRecord>,
    keys_by_path: HashMap<DocumentPath, i64>,
    cursor: Option<Document>,
    end_reached: bool,
}

impl PageState {
    pub fn new(folder: MessageFolder) -> Self {
        Self {
            folder,
            records: BTreeMap::new(),
            keys_by_path: HashMap::new(),
            cursor: None,
            end_reached: false,
        }
    }

    pub fn folder(&self) -> MessageFolder {
        self.folder
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cursor(&self) -> Option<&Document> {
        self.cursor.as_ref()
    }

    pub fn end_reached(&self) -> bool {
        self.end_reached
    }

    /// Records newest-first.
    pub fn snapshot(&self) -> Vec<MessageRecord> {
        self.records.values().cloned().collect()
    }

    pub fn get(&self, sort_key: i64) -> Option<&MessageRecord> {
        self.records.get(&Reverse(sort_key))
    }

    /// Clear records, cursor and the end flag.
    pub fn reset(&mut self) {
        self.records.clear();
        self.keys_by_path.clear();
        self.cursor = None;
        self.end_reached = false;
    }

    /// Apply the changes of `batch`. When `advance` is set the batch also
    /// moves the page boundary: an empty result marks the end of data,
    /// otherwise the cursor moves to its last document.
    pub fn apply_batch(&mut self, batch: &ChangeBatch, advance: bool) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for change in &batch.changes {
            match change.kind {
                ChangeKind::Added | ChangeKind::Modified => {
                    match decode_message(&change.document, self.folder) {
                        Ok(record) => {
                            self.upsert(record.clone());
                            outcome.upserted.push(record);
                        }
                        Err(e) => {
                            warn!(
                                path = %change.document.path,
                                folder = %self.folder,
                                error = %e,
                                "dropping malformed message"
                            );
                            outcome.malformed += 1;
                        }
                    }
                }
                ChangeKind::Removed => {
                    if self.remove(&change.document.path) {
                        outcome.removed += 1;
                    }
                }
            }
        }

        if advance {
            match batch.last_document() {
                None => self.end_reached = true,
                Some(last) => self.cursor = Some(last.clone()),
            }
        }
        outcome
    }

    /// Same key replaces; a record that moved to a new key leaves its old one.
    fn upsert(&mut self, record: MessageRecord) {
        let key = record.sort_key;
        let path = record.path.clone();
        if let Some(old_key) = self.keys_by_path.insert(path.clone(), key) {
            if old_key != key {
                self.records.remove(&Reverse(old_key));
            }
        }
        // Another document on the same key loses it: last write wins.
        if let Some(displaced) = self.records.insert(Reverse(key), record) {
            if displaced.path != path {
                self.keys_by_path.remove(&displaced.path);
            }
        }
    }

    fn remove(&mut self, path: &DocumentPath) -> bool {
        match self.keys_by_path.remove(path) {
            Some(key) => self.records.remove(&Reverse(key)).is_some(),
            None => false,
        }
    }
}
