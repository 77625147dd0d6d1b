//! Local key-value preferences: staleness markers and snapshot-empty flags.
//!
//! Keys are scoped per customer so two accounts on one device never share
//! markers. Writes are last-write-wins; there is no cross-key transaction.

mod lmdb;
mod memory;

pub use lmdb::LmdbPreferenceStore;
pub use memory::InMemoryPreferenceStore;

use async_trait::async_trait;
use convoy_core::{CustomerId, MarkerKind, PreferenceError, UnixSeconds};

/// Build the stored key for `key` under `customer_id`.
pub fn scoped_key(customer_id: &str, key: &str) -> String {
    format!("{customer_id}/{key}")
}

#[async_trait]
pub trait PreferenceStore: Send + Sync + 'static {
    async fn get_i64(&self, key: &str) -> Result<Option<i64>, PreferenceError>;

    async fn set_i64(&self, key: &str, value: i64) -> Result<(), PreferenceError>;

    async fn get_bool(&self, key: &str) -> Result<Option<bool>, PreferenceError>;

    async fn set_bool(&self, key: &str, value: bool) -> Result<(), PreferenceError>;

    /// Locally persisted copy of a staleness marker; zero when never stored.
    async fn local_marker(
        &self,
        customer_id: &CustomerId,
        kind: MarkerKind,
    ) -> Result<UnixSeconds, PreferenceError> {
        let key = scoped_key(customer_id, kind.preference_key());
        Ok(self.get_i64(&key).await?.unwrap_or(0))
    }

    async fn set_local_marker(
        &self,
        customer_id: &CustomerId,
        kind: MarkerKind,
        value: UnixSeconds,
    ) -> Result<(), PreferenceError> {
        let key = scoped_key(customer_id, kind.preference_key());
        self.set_i64(&key, value).await
    }

    /// Absent flags read as `false`.
    async fn flag(&self, customer_id: &CustomerId, key: &str) -> Result<bool, PreferenceError> {
        Ok(self
            .get_bool(&scoped_key(customer_id, key))
            .await?
            .unwrap_or(false))
    }

    async fn set_flag(
        &self,
        customer_id: &CustomerId,
        key: &str,
        value: bool,
    ) -> Result<(), PreferenceError> {
        self.set_bool(&scoped_key(customer_id, key), value).await
    }
}
