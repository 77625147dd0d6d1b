//! In-memory preference store for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use convoy_core::PreferenceError;

use super::PreferenceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stored {
    Int(i64),
    Bool(bool),
}

#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    values: RwLock<HashMap<String, Stored>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Result<Option<Stored>, PreferenceError> {
        let values = self
            .values
            .read()
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;
        Ok(values.get(key).copied())
    }

    fn put(&self, key: &str, value: Stored) -> Result<(), PreferenceError> {
        let mut values = self
            .values
            .write()
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get_i64(&self, key: &str) -> Result<Option<i64>, PreferenceError> {
        match self.get(key)? {
            None => Ok(None),
            Some(Stored::Int(v)) => Ok(Some(v)),
            Some(Stored::Bool(_)) => Err(PreferenceError::Corrupt {
                key: key.to_string(),
                reason: "stored as bool".to_string(),
            }),
        }
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<(), PreferenceError> {
        self.put(key, Stored::Int(value))
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>, PreferenceError> {
        match self.get(key)? {
            None => Ok(None),
            Some(Stored::Bool(v)) => Ok(Some(v)),
            Some(Stored::Int(_)) => Err(PreferenceError::Corrupt {
                key: key.to_string(),
                reason: "stored as integer".to_string(),
            }),
        }
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<(), PreferenceError> {
        self.put(key, Stored::Bool(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_type_mismatch_is_corrupt() {
        let prefs = InMemoryPreferenceStore::new();
        prefs.set_bool("k", true).await.unwrap();
        let err = prefs.get_i64("k").await.unwrap_err();
        assert!(matches!(err, PreferenceError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let prefs = InMemoryPreferenceStore::new();
        prefs.set_i64("k", 1).await.unwrap();
        prefs.set_i64("k", 2).await.unwrap();
        assert_eq!(prefs.get_i64("k").await.unwrap(), Some(2));
    }
}
