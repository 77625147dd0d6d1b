//! Acknowledgment ordering and idempotence.

use std::sync::Arc;
use std::time::Duration;

use convoy_core::constants::{FIELD_IS_DELIVERED, FIELD_IS_READ};
use convoy_core::{paths, AckEventKind, AckSource, AckState, MessageFolder, SyncConfig};
use convoy_storage::InMemoryRemoteStore;
use convoy_sync::{AckOutcome, AckSequencer, SyncEvent, SyncEvents};
use convoy_test_utils::generators::arb_ack_flags;
use convoy_test_utils::{inbox_message, Op, RecordingStore, CUSTOMER_ID, VEHICLE_ID};
use proptest::prelude::*;
use serde_json::json;

const READ_DELAY: Duration = Duration::from_millis(1000);

type Store = RecordingStore<InMemoryRemoteStore>;

fn setup(asn: i64, delivered: bool, read: bool) -> Arc<Store> {
    let store = Arc::new(RecordingStore::new(InMemoryRemoteStore::new()));
    store.inner().seed(
        inbox_message(CUSTOMER_ID, VEHICLE_ID, asn)
            .with_field(FIELD_IS_DELIVERED, delivered)
            .with_field(FIELD_IS_READ, read),
    );
    store
}

fn sequencer(store: &Arc<Store>, events: SyncEvents) -> AckSequencer<Store> {
    let config = SyncConfig::default().with_ack_read_delay(READ_DELAY);
    AckSequencer::new(Arc::clone(store), &config, events)
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_full_sequence_write_order_and_delay() {
    let store = setup(42, false, false);
    let acks = sequencer(&store, SyncEvents::new(8));

    let outcome = acks
        .acknowledge(CUSTOMER_ID, VEHICLE_ID, 42, AckSource::ListScreen)
        .await;
    assert_eq!(
        outcome,
        AckOutcome::Advanced {
            from: AckState::Unacknowledged,
            to: AckState::ReadAndDelivered,
        }
    );

    let message = paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox).child(42);
    let timed = store.timed_ops();
    let ops: Vec<_> = timed.iter().map(|(_, op)| op.clone()).collect();
    assert_eq!(ops.len(), 4);

    match &ops[0] {
        Op::Create { path, fields, created } => {
            assert_eq!(path, &paths::ack_event(CUSTOMER_ID, VEHICLE_ID, 42, AckEventKind::Delivered));
            assert!(*created);
            assert_eq!(fields.get("event"), Some(&json!("delivered")));
            assert_eq!(fields.get("source"), Some(&json!("list_screen")));
        }
        other => panic!("expected delivered event creation, got {other:?}"),
    }
    assert_eq!(
        ops[1],
        Op::ConditionalUpdate {
            path: message.clone(),
            field: FIELD_IS_DELIVERED.to_string(),
            applied: true,
        }
    );
    assert_eq!(
        ops[2].path(),
        &paths::ack_event(CUSTOMER_ID, VEHICLE_ID, 42, AckEventKind::Read)
    );
    assert_eq!(
        ops[3],
        Op::ConditionalUpdate {
            path: message,
            field: FIELD_IS_READ.to_string(),
            applied: true,
        }
    );

    let gap = timed[2].0.duration_since(timed[1].0);
    assert!(gap >= READ_DELAY, "read confirmation came {gap:?} after delivery");
}

#[tokio::test(start_paused = true)]
async fn test_completion_is_published() {
    let store = setup(7, true, false);
    let events = SyncEvents::new(8);
    let mut rx = events.subscribe();
    let acks = sequencer(&store, events);

    acks.acknowledge(CUSTOMER_ID, VEHICLE_ID, 7, AckSource::NotificationTap)
        .await;

    match rx.recv().await.unwrap() {
        SyncEvent::AckCompleted { asn, state, .. } => {
            assert_eq!(asn, 7);
            assert_eq!(state, AckState::ReadAndDelivered);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_separate_sequencers_flip_each_flag_once() {
    // Two sequencers share no in-flight table, like two processes.
    let store = setup(9, false, false);
    let list = sequencer(&store, SyncEvents::new(8));
    let sweep = sequencer(&store, SyncEvents::new(8));

    let (a, b) = tokio::join!(
        list.acknowledge(CUSTOMER_ID, VEHICLE_ID, 9, AckSource::ListScreen),
        sweep.acknowledge(CUSTOMER_ID, VEHICLE_ID, 9, AckSource::FallbackSweep),
    );
    assert!(!matches!(a, AckOutcome::Failed(_)));
    assert!(!matches!(b, AckOutcome::Failed(_)));

    assert_eq!(store.applied_flips(FIELD_IS_DELIVERED), 1);
    assert_eq!(store.applied_flips(FIELD_IS_READ), 1);
    for kind in [AckEventKind::Delivered, AckEventKind::Read] {
        let event = paths::ack_event(CUSTOMER_ID, VEHICLE_ID, 9, kind);
        assert_eq!(store.creations(&event), 1, "{kind:?} confirmation sent more than once");
    }
}

#[tokio::test(start_paused = true)]
async fn test_sweep_during_read_delay_sends_read_once() {
    let store = setup(10, false, false);
    let list = sequencer(&store, SyncEvents::new(8));
    let sweep = sequencer(&store, SyncEvents::new(8));

    let (first, second) = tokio::join!(
        list.acknowledge(CUSTOMER_ID, VEHICLE_ID, 10, AckSource::ListScreen),
        async {
            // The list screen is now waiting between delivery and read.
            tokio::time::sleep(READ_DELAY / 2).await;
            sweep
                .acknowledge(CUSTOMER_ID, VEHICLE_ID, 10, AckSource::FallbackSweep)
                .await
        }
    );
    assert!(matches!(first, AckOutcome::Advanced { .. }));
    assert!(matches!(
        second,
        AckOutcome::Advanced {
            from: AckState::DeliveredOnly,
            ..
        }
    ));

    let read = paths::ack_event(CUSTOMER_ID, VEHICLE_ID, 10, AckEventKind::Read);
    assert_eq!(store.creations(&read), 1);
    assert_eq!(store.applied_flips(FIELD_IS_READ), 1);
    let event = store.inner().server_document(&read).unwrap();
    assert_eq!(event.get("source"), Some(&json!("fallback_sweep")));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_second_acknowledgment_writes_nothing((delivered, read) in arb_ack_flags()) {
        let rt = paused_runtime();
        rt.block_on(async {
            let store = setup(3, delivered, read);
            let acks = sequencer(&store, SyncEvents::new(8));

            acks.acknowledge(CUSTOMER_ID, VEHICLE_ID, 3, AckSource::ListScreen).await;
            let after_first = store.ops().len();
            let second = acks
                .acknowledge(CUSTOMER_ID, VEHICLE_ID, 3, AckSource::FallbackSweep)
                .await;

            prop_assert_eq!(second, AckOutcome::AlreadyAcknowledged);
            prop_assert_eq!(store.ops().len(), after_first);
            Ok(())
        })?;
    }

    #[test]
    fn prop_flags_only_move_forward((delivered, read) in arb_ack_flags()) {
        let rt = paused_runtime();
        rt.block_on(async {
            let store = setup(4, delivered, read);
            let acks = sequencer(&store, SyncEvents::new(8));
            acks.acknowledge(CUSTOMER_ID, VEHICLE_ID, 4, AckSource::ListScreen).await;

            let message = store
                .inner()
                .server_document(&paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox).child(4))
                .unwrap();
            prop_assert_eq!(message.get(FIELD_IS_DELIVERED), Some(&json!(true)));
            prop_assert_eq!(message.get(FIELD_IS_READ), Some(&json!(true)));

            let sent = |kind| store.creations(&paths::ack_event(CUSTOMER_ID, VEHICLE_ID, 4, kind));
            // A read flag without delivery still gets the delivery handshake,
            // but never a second read confirmation.
            prop_assert_eq!(sent(AckEventKind::Delivered), usize::from(!delivered));
            prop_assert_eq!(sent(AckEventKind::Read), usize::from(!read));
            prop_assert!(store.applied_flips(FIELD_IS_DELIVERED) <= 1);
            prop_assert!(store.applied_flips(FIELD_IS_READ) <= 1);
            Ok(())
        })?;
    }
}
