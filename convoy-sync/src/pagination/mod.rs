//! Paginated Change-Stream Aggregator
//!
//! One engine behind every message list (Inbox, Sent, Draft, Trash): live
//! page queries feed a single merge worker that keeps an ordered snapshot,
//! the next-page cursor and the end-of-data flag.

mod aggregator;
mod page_state;

pub use aggregator::MessageAggregator;
pub use page_state::{BatchOutcome, PageState};

use std::sync::Arc;

use convoy_core::{paths, CustomerId, ReadMode};
use convoy_storage::RemoteStore;
use dashmap::DashSet;
use tracing::{debug, warn};

/// Side-effect caching of form templates referenced by merged messages.
///
/// Called from the merge worker, so implementations must not block.
pub trait FormTemplatePrefetcher: Send + Sync + 'static {
    fn prefetch(&self, customer_id: &str, form_id: i64);
}

/// Warms the store cache with one server read per template.
pub struct StoreTemplatePrefetcher<S: RemoteStore> {
    store: Arc<S>,
    requested: Arc<DashSet<(CustomerId, i64)>>,
}

impl<S: RemoteStore> StoreTemplatePrefetcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            requested: Arc::new(DashSet::new()),
        }
    }

    pub fn requested_count(&self) -> usize {
        self.requested.len()
    }
}

impl<S: RemoteStore> FormTemplatePrefetcher for StoreTemplatePrefetcher<S> {
    fn prefetch(&self, customer_id: &str, form_id: i64) {
        let key = (customer_id.to_string(), form_id);
        if !self.requested.insert(key.clone()) {
            return;
        }

        let store = Arc::clone(&self.store);
        let requested = Arc::clone(&self.requested);
        let path = paths::form_template(customer_id, form_id);
        tokio::spawn(async move {
            match store.read_document(&path, ReadMode::Server).await {
                Ok(Some(_)) => debug!(path = %path, "form template cached"),
                Ok(None) => debug!(path = %path, "form template missing"),
                Err(e) => {
                    warn!(path = %path, error = %e, "form template prefetch failed");
                    // Allow a retry on the next reference.
                    requested.remove(&key);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::Document;
    use convoy_storage::InMemoryRemoteStore;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_prefetch_warms_cache_once() {
        let store = Arc::new(InMemoryRemoteStore::new());
        store.seed_server(Document::from_json(
            "customers/1/formTemplates/42",
            json!({"fields": []}),
        ));
        let prefetcher = StoreTemplatePrefetcher::new(Arc::clone(&store));

        prefetcher.prefetch("1", 42);
        prefetcher.prefetch("1", 42);
        assert_eq!(prefetcher.requested_count(), 1);

        let path = paths::form_template("1", 42);
        for _ in 0..50 {
            if store.cache_document(&path).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(store.cache_document(&path).is_some());
    }
}
