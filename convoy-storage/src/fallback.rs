//! Cache-or-server reads with a single cache retry on transient failure.
//!
//! Every resolution step uses the same cascade: pick a read mode (cache
//! unless it is empty or the caller forces the server), run the read, and
//! if the store reports a transient failure retry once against the cache.
//! The result carries where it was served from so callers can tell a full
//! network refresh from a degraded one.

use std::future::Future;
use std::sync::Arc;

use convoy_core::{Document, DocumentPath, ReadMode, StoreResult};
use tracing::{debug, warn};

use crate::traits::RemoteStore;

/// Read-mode policy chosen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Cache first; the server only when the cache holds nothing.
    #[default]
    PreferCache,
    /// Always go to the server first.
    ForceServer,
}

impl ReadPolicy {
    pub fn from_force_server(force_server: bool) -> Self {
        if force_server {
            Self::ForceServer
        } else {
            Self::PreferCache
        }
    }
}

/// Result of a fallback read, carrying where it was served from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    value: T,
    served_from: ReadMode,
    fell_back: bool,
}

impl<T> Fetched<T> {
    pub fn new(value: T, served_from: ReadMode, fell_back: bool) -> Self {
        Self {
            value,
            served_from,
            fell_back,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn served_from(&self) -> ReadMode {
        self.served_from
    }

    pub fn was_server(&self) -> bool {
        self.served_from.is_server()
    }

    /// True when the first attempt failed and the cache answered instead.
    pub fn fell_back(&self) -> bool {
        self.fell_back
    }

    pub fn map<U, F>(self, f: F) -> Fetched<U>
    where
        F: FnOnce(T) -> U,
    {
        Fetched {
            value: f(self.value),
            served_from: self.served_from,
            fell_back: self.fell_back,
        }
    }
}

/// Runs reads against a [`RemoteStore`] with the cache fallback cascade.
pub struct FallbackReader<S: RemoteStore> {
    store: Arc<S>,
}

impl<S: RemoteStore> Clone for FallbackReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RemoteStore> FallbackReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Pick the first read mode for `path` under `policy`.
    pub async fn initial_mode(&self, path: &DocumentPath, policy: ReadPolicy) -> ReadMode {
        match policy {
            ReadPolicy::ForceServer => ReadMode::Server,
            ReadPolicy::PreferCache => {
                if self.store.is_cache_empty(path).await {
                    ReadMode::Server
                } else {
                    ReadMode::Cache
                }
            }
        }
    }

    /// Generic cascade: `read(mode)` first with the policy's mode, then once
    /// more against the cache if that failed transiently.
    ///
    /// Non-transient errors (including cancellation) are returned untouched.
    pub async fn with_fallback<T, F, Fut>(
        &self,
        path: &DocumentPath,
        policy: ReadPolicy,
        read: F,
    ) -> StoreResult<Fetched<T>>
    where
        F: Fn(ReadMode) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mode = self.initial_mode(path, policy).await;
        match read(mode).await {
            Ok(value) => {
                debug!(path = %path, mode = %mode, "store read served");
                Ok(Fetched::new(value, mode, false))
            }
            Err(err) if err.is_transient() => {
                warn!(
                    path = %path,
                    mode = %mode,
                    error = %err,
                    "transient store failure, retrying against cache"
                );
                let value = read(ReadMode::Cache).await?;
                Ok(Fetched::new(value, ReadMode::Cache, true))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn read_collection(
        &self,
        path: &DocumentPath,
        policy: ReadPolicy,
    ) -> StoreResult<Fetched<Vec<Document>>> {
        let store = &*self.store;
        self.with_fallback(path, policy, move |mode| store.read_collection(path, mode))
            .await
    }

    pub async fn read_document(
        &self,
        path: &DocumentPath,
        policy: ReadPolicy,
    ) -> StoreResult<Fetched<Option<Document>>> {
        let store = &*self.store;
        self.with_fallback(path, policy, move |mode| store.read_document(path, mode))
            .await
    }
}
