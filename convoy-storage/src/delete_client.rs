//! Bulk collection delete.
//!
//! The document store cannot drop a whole collection from the client, so
//! permanent deletion goes through an authenticated HTTP service. Failures
//! never surface as errors: every outcome is a [`DeleteResponse`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use convoy_core::{ConfigError, DocumentPath, ReadMode, SyncConfig};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::traits::RemoteStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl DeleteResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    path: &'a str,
}

#[async_trait]
pub trait CollectionDeleter: Send + Sync + 'static {
    async fn delete_collection(&self, collection: &DocumentPath) -> DeleteResponse;
}

/// HTTP client for the collection-delete service.
#[derive(Clone, Debug)]
pub struct CollectionDeleteClient {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl CollectionDeleteClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "delete_service_url".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "delete_service_url".to_string(),
                value: base.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: format!("{base}/collections/delete"),
            headers: HeaderMap::new(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        Self::new(&config.delete_service_url, config.delete_timeout)
    }

    pub fn with_bearer_token(mut self, token: &str) -> Result<Self, ConfigError> {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            ConfigError::InvalidValue {
                field: "bearer_token".to_string(),
                value: "<redacted>".to_string(),
                reason: e.to_string(),
            }
        })?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CollectionDeleter for CollectionDeleteClient {
    async fn delete_collection(&self, collection: &DocumentPath) -> DeleteResponse {
        let request = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&DeleteRequest {
                path: collection.as_str(),
            });

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %collection, error = %e, "collection delete request failed");
                return DeleteResponse::failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(path = %collection, status = %status, "collection delete rejected");
            return DeleteResponse::failed(format!("HTTP {status}: {body}"));
        }

        match response.json::<DeleteResponse>().await {
            Ok(parsed) => {
                debug!(path = %collection, success = parsed.success, "collection delete answered");
                parsed
            }
            Err(e) => DeleteResponse::failed(format!("invalid response body: {e}")),
        }
    }
}

/// Deletes a collection document by document through the store itself.
///
/// Used where no delete service is deployed, and by the demo binary.
pub struct StoreCollectionDeleter<S: RemoteStore> {
    store: Arc<S>,
}

impl<S: RemoteStore> StoreCollectionDeleter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: RemoteStore> CollectionDeleter for StoreCollectionDeleter<S> {
    async fn delete_collection(&self, collection: &DocumentPath) -> DeleteResponse {
        let docs = match self.store.read_collection(collection, ReadMode::Server).await {
            Ok(docs) => docs,
            Err(e) => return DeleteResponse::failed(e.to_string()),
        };
        let total = docs.len();
        for doc in docs {
            if let Err(e) = self.store.delete(&doc.path).await {
                return DeleteResponse::failed(format!("{}: {e}", doc.path));
            }
        }
        DeleteResponse::ok(format!("deleted {total} documents"))
    }
}
