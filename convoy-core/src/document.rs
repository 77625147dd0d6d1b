//! Store documents and hierarchical paths.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field map of a store document.
pub type Fields = Map<String, Value>;

/// A `/`-separated store path. Odd segment counts address collections,
/// even counts address documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn new(path: impl Into<String>) -> Self {
        let raw: String = path.into();
        Self(raw.trim_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn is_collection(&self) -> bool {
        self.segments().count() % 2 == 1
    }

    /// Last segment: the document id or collection name.
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or("")
    }

    /// Path with the last segment removed, or `None` at the root.
    pub fn parent(&self) -> Option<DocumentPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocumentPath(parent.to_string()))
    }

    pub fn child(&self, segment: impl fmt::Display) -> DocumentPath {
        DocumentPath(format!("{}/{}", self.0, segment))
    }

    /// True when `self` is a document directly inside `collection`.
    pub fn is_child_of(&self, collection: &DocumentPath) -> bool {
        self.parent().as_ref() == Some(collection)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A document snapshot: its path plus field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocumentPath,
    pub fields: Fields,
}

impl Document {
    pub fn new(path: DocumentPath, fields: Fields) -> Self {
        Self { path, fields }
    }

    /// Build a document from a JSON object literal. Non-object values yield
    /// an empty field map.
    pub fn from_json(path: impl Into<DocumentPath>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        Self {
            path: path.into(),
            fields,
        }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

impl From<String> for DocumentPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
