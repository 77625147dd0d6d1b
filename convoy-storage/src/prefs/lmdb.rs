//! LMDB-backed preference store.
//!
//! Uses heed over a single unnamed database. Values are tagged bytes:
//! `[tag: 1 byte][payload]`, where an integer payload is 8 little-endian
//! bytes and a bool payload is one byte.

use std::path::Path;

use async_trait::async_trait;
use convoy_core::PreferenceError;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tracing::debug;

use super::PreferenceStore;

const TAG_INT: u8 = 1;
const TAG_BOOL: u8 = 2;

pub struct LmdbPreferenceStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbPreferenceStore {
    /// Open (creating if needed) the store under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError::Open`] if the directory cannot be created or
    /// the environment cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, PreferenceError> {
        std::fs::create_dir_all(&path).map_err(|e| PreferenceError::Open(e.to_string()))?;

        // SAFETY: the environment is opened once per path by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| PreferenceError::Open(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| PreferenceError::Open(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;

        debug!(path = %path.as_ref().display(), "preference store opened");
        Ok(Self { env, db })
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, PreferenceError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;
        Ok(value.map(<[u8]>::to_vec))
    }

    fn put_raw(&self, key: &str, bytes: &[u8]) -> Result<(), PreferenceError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, key.as_bytes(), bytes)
            .map_err(|e| PreferenceError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| PreferenceError::Transaction(e.to_string()))
    }
}

fn corrupt(key: &str, reason: &str) -> PreferenceError {
    PreferenceError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn decode_int(key: &str, bytes: &[u8]) -> Result<i64, PreferenceError> {
    match bytes.split_first() {
        Some((&TAG_INT, payload)) => {
            let raw: [u8; 8] = payload
                .try_into()
                .map_err(|_| corrupt(key, "integer payload is not 8 bytes"))?;
            Ok(i64::from_le_bytes(raw))
        }
        Some(_) => Err(corrupt(key, "not an integer")),
        None => Err(corrupt(key, "empty value")),
    }
}

fn decode_bool(key: &str, bytes: &[u8]) -> Result<bool, PreferenceError> {
    match bytes {
        [TAG_BOOL, 0] => Ok(false),
        [TAG_BOOL, 1] => Ok(true),
        [TAG_BOOL, ..] => Err(corrupt(key, "bool payload is not 0 or 1")),
        [] => Err(corrupt(key, "empty value")),
        _ => Err(corrupt(key, "not a bool")),
    }
}

#[async_trait]
impl PreferenceStore for LmdbPreferenceStore {
    async fn get_i64(&self, key: &str) -> Result<Option<i64>, PreferenceError> {
        self.get_raw(key)?
            .map(|bytes| decode_int(key, &bytes))
            .transpose()
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<(), PreferenceError> {
        let mut bytes = Vec::with_capacity(9);
        bytes.push(TAG_INT);
        bytes.extend_from_slice(&value.to_le_bytes());
        self.put_raw(key, &bytes)
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>, PreferenceError> {
        self.get_raw(key)?
            .map(|bytes| decode_bool(key, &bytes))
            .transpose()
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<(), PreferenceError> {
        self.put_raw(key, &[TAG_BOOL, u8::from(value)])
    }
}
