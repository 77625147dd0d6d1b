//! One driver session through the engine: resolve, refresh, page, ack, trash.

use std::sync::Arc;
use std::time::Duration;

use convoy_core::{AckSource, AckState, MessageFolder, SyncConfig};
use convoy_storage::{InMemoryPreferenceStore, InMemoryRemoteStore, StoreCollectionDeleter};
use convoy_sync::{AckOutcome, SyncEngine, SyncEvent, TaskOutcome};
use convoy_test_utils::{paths, seed_driver_scenario, seed_inbox, CUSTOMER_ID, OBC_ID, VEHICLE_ID};
use futures_util::StreamExt;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn engine(store: &Arc<InMemoryRemoteStore>) -> SyncEngine<InMemoryRemoteStore> {
    SyncEngine::new(
        Arc::clone(store),
        Arc::new(InMemoryPreferenceStore::new()),
        SyncConfig::default().with_ack_read_delay(Duration::from_millis(10)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_driver_session() {
    let store = Arc::new(InMemoryRemoteStore::new());
    seed_driver_scenario(&store);
    seed_inbox(&store, CUSTOMER_ID, VEHICLE_ID, 1..=3);
    let engine = engine(&store);
    let events = engine.events().stream_for(CUSTOMER_ID);
    tokio::pin!(events);

    let view = engine
        .group_resolver()
        .resolve_all(CUSTOMER_ID, OBC_ID, false)
        .await
        .unwrap();
    assert!(view.is_complete());

    // Fresh device: nothing persisted locally, so the gate refreshes once.
    let check = engine.staleness_gate().check(CUSTOMER_ID, OBC_ID).await.unwrap();
    assert_eq!(check.refresh.unwrap().wait().await, TaskOutcome::Completed);
    assert!(!engine
        .staleness_gate()
        .check_and_refresh_if_stale(CUSTOMER_ID, OBC_ID)
        .await
        .unwrap());

    let inbox = engine.aggregator(MessageFolder::Inbox);
    let mut snapshot = inbox.snapshot();
    inbox.load_page(CUSTOMER_ID, VEHICLE_ID, true).await.unwrap();
    timeout(WAIT, snapshot.wait_for(|s| s.len() == 3))
        .await
        .unwrap()
        .unwrap();

    let outcome = engine
        .acks()
        .acknowledge(CUSTOMER_ID, VEHICLE_ID, 3, AckSource::ListScreen)
        .await;
    assert!(matches!(outcome, AckOutcome::Advanced { .. }));
    timeout(
        WAIT,
        snapshot.wait_for(|s| s[0].ack_state() == AckState::ReadAndDelivered),
    )
    .await
    .unwrap()
    .unwrap();

    let trash = engine.trash_mover(Arc::new(StoreCollectionDeleter::new(Arc::clone(&store))));
    trash
        .move_to_trash(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox, "1")
        .await
        .unwrap();
    timeout(WAIT, snapshot.wait_for(|s| s.len() == 2))
        .await
        .unwrap()
        .unwrap();
    assert!(trash.empty_trash(CUSTOMER_ID, VEHICLE_ID).await.success);
    assert!(store
        .server_document(&paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Trash).child(1))
        .is_none());

    let mut seen = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(100), events.next()).await {
        seen.push(event.event_type());
        if matches!(event, SyncEvent::MessageMoved { .. }) {
            break;
        }
    }
    assert_eq!(
        seen,
        vec!["RefreshStarted", "RefreshCompleted", "AckCompleted", "MessageMoved"]
    );

    engine.shutdown();
    assert!(engine.supervisor().is_shut_down());
}
