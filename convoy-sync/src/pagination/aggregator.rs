use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use convoy_core::{
    paths, CustomerId, MessageFolder, MessageRecord, StoreResult, SyncConfig, VehicleId,
};
use convoy_storage::{ChangeBatch, PageQuery, RemoteStore};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::page_state::PageState;
use super::FormTemplatePrefetcher;

/// One batch routed from a page listener to the merge worker.
struct ListenerBatch {
    generation: u64,
    listener: u64,
    customer_id: CustomerId,
    batch: ChangeBatch,
}

struct Merge {
    state: PageState,
    /// Only the newest page listener moves the cursor and end flag.
    latest_listener: u64,
}

struct Shared {
    merge: Mutex<Merge>,
    generation: AtomicU64,
    snapshot_tx: watch::Sender<Vec<MessageRecord>>,
    end_tx: watch::Sender<bool>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Merge> {
        self.merge.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PageState) {
        self.snapshot_tx.send_replace(state.snapshot());
        let end = state.end_reached();
        self.end_tx.send_if_modified(|current| {
            let changed = *current != end;
            *current = end;
            changed
        });
    }
}

/// Live, paginated, merged view of one message folder.
///
/// Batches from every page listener pass through one channel into a single
/// worker, so they are applied strictly in delivery order. Dropping the
/// aggregator detaches all listeners.
pub struct MessageAggregator<S: RemoteStore> {
    store: Arc<S>,
    folder: MessageFolder,
    page_size: usize,
    shared: Arc<Shared>,
    merge_tx: mpsc::UnboundedSender<ListenerBatch>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    next_listener: AtomicU64,
    worker: JoinHandle<()>,
}

impl<S: RemoteStore> MessageAggregator<S> {
    /// Must be created inside a tokio runtime; the merge worker starts here.
    pub fn new(
        store: Arc<S>,
        folder: MessageFolder,
        config: &SyncConfig,
        prefetcher: Option<Arc<dyn FormTemplatePrefetcher>>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        let (end_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            merge: Mutex::new(Merge {
                state: PageState::new(folder),
                latest_listener: 0,
            }),
            generation: AtomicU64::new(0),
            snapshot_tx,
            end_tx,
        });

        let (merge_tx, merge_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(merge_worker(Arc::clone(&shared), merge_rx, prefetcher));

        Self {
            store,
            folder,
            page_size: config.page_size,
            shared,
            merge_tx,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            worker,
        }
    }

    pub fn folder(&self) -> MessageFolder {
        self.folder
    }

    /// Subscribe to the next page. A first-page load detaches every listener
    /// and starts over from an empty state.
    pub async fn load_page(
        &self,
        customer_id: &str,
        vehicle_id: VehicleId,
        is_first_page: bool,
    ) -> StoreResult<()> {
        if is_first_page {
            self.detach();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            let mut merge = self.shared.lock();
            merge.state.reset();
            self.shared.publish(&merge.state);
        }

        let listener = self.next_listener.fetch_add(1, Ordering::SeqCst);
        let cursor = self.shared.lock().state.cursor().cloned();
        let generation = self.shared.generation.load(Ordering::SeqCst);

        let collection = paths::folder(customer_id, vehicle_id, self.folder);
        let query = PageQuery::newest_first(collection, self.folder.key_field(), self.page_size)
            .start_after(if is_first_page { None } else { cursor });

        let mut stream = match self.store.watch(query).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    customer_id,
                    vehicle_id = %vehicle_id,
                    folder = %self.folder,
                    error = %e,
                    "page subscription failed"
                );
                return Err(e);
            }
        };
        // Only a listener that exists takes over the page boundary.
        self.shared.lock().latest_listener = listener;

        let merge_tx = self.merge_tx.clone();
        let customer_id = customer_id.to_string();
        let folder = self.folder;
        let pump = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(batch) => {
                        let routed = ListenerBatch {
                            generation,
                            listener,
                            customer_id: customer_id.clone(),
                            batch,
                        };
                        if merge_tx.send(routed).is_err() {
                            break;
                        }
                    }
                    // The last good snapshot stays valid.
                    Err(e) => warn!(folder = %folder, listener, error = %e, "change stream error"),
                }
            }
            debug!(folder = %folder, listener, "change stream ended");
        });

        self.lock_listeners().push(pump);
        debug!(folder = %self.folder, listener, is_first_page, "page listener attached");
        Ok(())
    }

    /// Clear records and the end flag; the next load starts from the top.
    /// Live listeners stay attached.
    pub fn reset_pagination(&self) {
        let mut merge = self.shared.lock();
        merge.state.reset();
        self.shared.publish(&merge.state);
    }

    /// Drop every live page listener. Returns how many were attached.
    pub fn detach(&self) -> usize {
        let mut listeners = self.lock_listeners();
        let count = listeners.len();
        for pump in listeners.drain(..) {
            pump.abort();
        }
        if count > 0 {
            debug!(folder = %self.folder, count, "page listeners detached");
        }
        count
    }

    /// Listeners whose stream has not ended.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.lock_listeners();
        listeners.retain(|pump| !pump.is_finished());
        listeners.len()
    }

    /// Live snapshot, newest-first.
    pub fn snapshot(&self) -> watch::Receiver<Vec<MessageRecord>> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn end_reached(&self) -> watch::Receiver<bool> {
        self.shared.end_tx.subscribe()
    }

    pub fn current_snapshot(&self) -> Vec<MessageRecord> {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn is_end_reached(&self) -> bool {
        *self.shared.end_tx.borrow()
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: RemoteStore> Drop for MessageAggregator<S> {
    fn drop(&mut self) {
        self.detach();
        self.worker.abort();
    }
}

async fn merge_worker(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<ListenerBatch>,
    prefetcher: Option<Arc<dyn FormTemplatePrefetcher>>,
) {
    while let Some(routed) = rx.recv().await {
        if routed.generation != shared.generation.load(Ordering::SeqCst) {
            debug!(listener = routed.listener, "discarding batch from a reset page set");
            continue;
        }

        let outcome = {
            let mut merge = shared.lock();
            let advance = routed.listener == merge.latest_listener;
            let outcome = merge.state.apply_batch(&routed.batch, advance);
            shared.publish(&merge.state);
            outcome
        };

        if let Some(prefetcher) = &prefetcher {
            for form_id in outcome.upserted.iter().filter_map(|r| r.form_id) {
                prefetcher.prefetch(&routed.customer_id, form_id);
            }
        }
    }
}
