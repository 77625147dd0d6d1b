//! Paginated folder views against live in-memory queries.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use convoy_core::{paths, Document, MessageFolder, MessageRecord, StoreError, SyncConfig};
use convoy_storage::{InMemoryRemoteStore, RemoteStore, UpdatePredicate, WriteMode};
use convoy_sync::{FormTemplatePrefetcher, MessageAggregator};
use convoy_test_utils::{inbox_message, seed_inbox, ReadMode, CUSTOMER_ID, VEHICLE_ID};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn inbox(store: &Arc<InMemoryRemoteStore>) -> MessageAggregator<InMemoryRemoteStore> {
    MessageAggregator::new(
        Arc::clone(store),
        MessageFolder::Inbox,
        &SyncConfig::default(),
        None,
    )
}

fn keys(records: &[MessageRecord]) -> Vec<i64> {
    records.iter().map(|r| r.sort_key).collect()
}

async fn wait_for_snapshot<F>(rx: &mut watch::Receiver<Vec<MessageRecord>>, mut pred: F)
where
    F: FnMut(&Vec<MessageRecord>) -> bool,
{
    timeout(WAIT, rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot channel closed");
}

async fn wait_for_end(rx: &mut watch::Receiver<bool>) {
    timeout(WAIT, rx.wait_for(|end| *end))
        .await
        .expect("timed out waiting for end of data")
        .expect("end channel closed");
}

/// Let spawned pumps and the merge worker drain.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_first_page_is_newest_page_size_records() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=30);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;

    assert_eq!(keys(&aggregator.current_snapshot()), (11..=30).rev().collect::<Vec<_>>());
    assert!(!aggregator.is_end_reached());
}

#[tokio::test]
async fn test_empty_next_page_marks_end_and_keeps_records() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=20);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();
    let mut end = aggregator.end_reached();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;
    assert!(!aggregator.is_end_reached());

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, false).await.unwrap();
    wait_for_end(&mut end).await;
    assert_eq!(aggregator.current_snapshot().len(), 20);
}

#[tokio::test]
async fn test_next_page_continues_after_cursor() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=25);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();
    let mut end = aggregator.end_reached();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;
    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, false).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 25).await;

    assert_eq!(keys(&aggregator.current_snapshot()), (1..=25).rev().collect::<Vec<_>>());
    assert!(!aggregator.is_end_reached());
    assert_eq!(aggregator.listener_count(), 2);

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, false).await.unwrap();
    wait_for_end(&mut end).await;
    assert_eq!(aggregator.current_snapshot().len(), 25);
}

#[tokio::test]
async fn test_live_modification_and_removal_are_merged() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=5);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 5).await;

    let folder = paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox);
    store
        .conditional_update(&folder.child(3), "isRead", UpdatePredicate::AbsentOrFalse, json!(true))
        .await
        .unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.iter().any(|r| r.sort_key == 3 && r.is_read)).await;

    store.delete(&folder.child(2)).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 4).await;
    assert_eq!(keys(&aggregator.current_snapshot()), vec![5, 4, 3, 1]);

    store
        .write(
            &folder.child(6),
            inbox_message(CUSTOMER_ID, VEHICLE_ID, 6).fields,
            WriteMode::Set,
        )
        .await
        .unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.first().map(|r| r.sort_key) == Some(6)).await;
}

#[tokio::test]
async fn test_malformed_message_is_dropped() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=3);
    store.seed(Document::from_json(
        paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox).child("bad"),
        json!({"asn": "not-a-number", "createdUnixTime": 5}),
    ));
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| !s.is_empty()).await;
    settle().await;

    assert_eq!(keys(&aggregator.current_snapshot()), vec![3, 2, 1]);
}

#[tokio::test]
async fn test_first_page_reload_detaches_and_starts_over() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=25);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;
    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, false).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 25).await;

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;
    settle().await;

    assert_eq!(aggregator.listener_count(), 1);
    assert_eq!(keys(&aggregator.current_snapshot()), (6..=25).rev().collect::<Vec<_>>());
    assert!(!aggregator.is_end_reached());
}

#[tokio::test]
async fn test_detached_aggregator_ignores_changes() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=3);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 3).await;

    assert_eq!(aggregator.detach(), 1);
    store.seed(inbox_message(CUSTOMER_ID, VEHICLE_ID, 4));
    settle().await;

    assert_eq!(aggregator.current_snapshot().len(), 3);
    assert_eq!(aggregator.listener_count(), 0);
}

#[tokio::test]
async fn test_reset_pagination_keeps_listeners_and_restarts_from_top() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=25);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;

    aggregator.reset_pagination();
    assert!(aggregator.current_snapshot().is_empty());
    assert!(!aggregator.is_end_reached());
    assert_eq!(aggregator.listener_count(), 1);

    // No cursor after a reset: the next page is the top again.
    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, false).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;
    assert_eq!(aggregator.current_snapshot()[0].sort_key, 25);
}

#[tokio::test]
async fn test_sent_folder_orders_by_creation_time() {
    let store = Arc::new(InMemoryRemoteStore::new());
    let sent = paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Sent);
    for (id, created) in [("a", 300), ("b", 100), ("c", 200)] {
        store.seed(Document::from_json(
            sent.child(id),
            json!({"createdUnixTime": created, "payload": {"text": id}}),
        ));
    }
    let aggregator = MessageAggregator::new(
        Arc::clone(&store),
        MessageFolder::Sent,
        &SyncConfig::default(),
        None,
    );
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 3).await;

    let ids: Vec<_> = aggregator
        .current_snapshot()
        .iter()
        .map(|r| r.path.id().to_string())
        .collect();
    assert_eq!(ids, vec!["a", "c", "b"]);
}

#[tokio::test]
async fn test_subscription_failure_is_returned() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.fail_next(
        ReadMode::Server,
        paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox).as_str(),
        StoreError::PermissionDenied {
            path: "inbox".to_string(),
        },
    );
    let aggregator = inbox(&store);

    let err = aggregator
        .load_page(CUSTOMER_ID, VEHICLE_ID, true)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PermissionDenied { .. }));
    assert_eq!(aggregator.listener_count(), 0);
}

#[tokio::test]
async fn test_failed_next_page_keeps_previous_page_in_charge() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=25);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 20).await;

    store.fail_next(
        ReadMode::Server,
        paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox).as_str(),
        StoreError::unavailable("inbox", "connection reset"),
    );
    assert!(aggregator
        .load_page(CUSTOMER_ID, VEHICLE_ID, false)
        .await
        .is_err());

    // The first page slides to 26..7; its boundary must follow.
    store.seed(inbox_message(CUSTOMER_ID, VEHICLE_ID, 26));
    wait_for_snapshot(&mut snapshot, |s| s.first().map(|r| r.sort_key) == Some(26)).await;

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, false).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 26).await;
    assert_eq!(keys(&aggregator.current_snapshot()), (1..=26).rev().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_change_stream_error_keeps_last_snapshot() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=3);
    let aggregator = inbox(&store);
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 3).await;

    store.fail_watchers(
        &paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox),
        StoreError::unavailable("inbox", "stream interrupted"),
    );
    settle().await;
    assert_eq!(keys(&aggregator.current_snapshot()), vec![3, 2, 1]);
    assert_eq!(aggregator.listener_count(), 1);

    store.seed(inbox_message(CUSTOMER_ID, VEHICLE_ID, 4));
    wait_for_snapshot(&mut snapshot, |s| s.len() == 4).await;
    assert_eq!(keys(&aggregator.current_snapshot()), vec![4, 3, 2, 1]);
}

#[derive(Default)]
struct CollectingPrefetcher {
    seen: Mutex<Vec<(String, i64)>>,
}

impl FormTemplatePrefetcher for CollectingPrefetcher {
    fn prefetch(&self, customer_id: &str, form_id: i64) {
        self.seen
            .lock()
            .unwrap()
            .push((customer_id.to_string(), form_id));
    }
}

#[tokio::test]
async fn test_merged_messages_prefetch_their_form_templates() {
    let store = Arc::new(InMemoryRemoteStore::new());
    store.seed(inbox_message(CUSTOMER_ID, VEHICLE_ID, 1).with_field("formId", 11));
    store.seed(inbox_message(CUSTOMER_ID, VEHICLE_ID, 2));
    let prefetcher = Arc::new(CollectingPrefetcher::default());
    let aggregator = MessageAggregator::new(
        Arc::clone(&store),
        MessageFolder::Inbox,
        &SyncConfig::default(),
        Some(Arc::clone(&prefetcher) as Arc<dyn FormTemplatePrefetcher>),
    );
    let mut snapshot = aggregator.snapshot();

    aggregator.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    wait_for_snapshot(&mut snapshot, |s| s.len() == 2).await;
    settle().await;

    assert_eq!(
        *prefetcher.seen.lock().unwrap(),
        vec![(CUSTOMER_ID.to_string(), 11)]
    );
}
