//! Drives the engine against an in-memory store seeded with one customer,
//! one unit and a page of inbox messages.

use std::sync::Arc;
use std::time::Duration;

use convoy_core::{
    paths, AckSource, Cancelled, ConfigError, Document, GroupId, MessageFolder, ObcId, StoreError,
    SyncConfig, VehicleId,
};
use convoy_storage::{
    InMemoryPreferenceStore, InMemoryRemoteStore, LmdbPreferenceStore, PreferenceStore,
    StoreCollectionDeleter,
};
use convoy_sync::{init_tracing, SyncEngine, TelemetryConfig, TelemetryError};
use serde_json::json;
use tracing::{info, warn};

const CUSTOMER: &str = "10119";
const OBC: ObcId = ObcId(99);
const VEHICLE: VehicleId = VehicleId(500);

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

fn seed(store: &InMemoryRemoteStore) {
    store.seed_server(Document::from_json(
        paths::unit(CUSTOMER, OBC),
        json!({"vid": VEHICLE.get(), "cid": CUSTOMER}),
    ));
    store.seed_server(Document::from_json(
        paths::vehicle_groups(CUSTOMER, VEHICLE).child("membership"),
        json!({"gid": {"7": true, "8": false}}),
    ));
    store.seed_server(Document::from_json(
        paths::group_forms(CUSTOMER, GroupId(7)).child("pretrip"),
        json!({"formId": 11, "formClass": 2, "name": "Pre-trip", "inUseBits": 1, "driverOriginated": 1}),
    ));
    store.seed_server(Document::from_json(
        paths::group_users(CUSTOMER, GroupId(7)).child("u1"),
        json!({"uid": "u1", "username": "dispatch", "active": true, "addressBookEligible": true}),
    ));
    for asn in 1..=25_i64 {
        store.seed_server(Document::from_json(
            paths::folder(CUSTOMER, VEHICLE, MessageFolder::Inbox).child(asn),
            json!({"asn": asn, "createdUnixTime": 1_700_000_000 + asn, "formId": 11, "payload": {"text": format!("message {asn}")}}),
        ));
    }
}

fn open_prefs(config: &SyncConfig) -> Arc<dyn PreferenceStore> {
    match LmdbPreferenceStore::open(&config.preferences_path, config.preferences_max_size_mb) {
        Ok(prefs) => Arc::new(prefs),
        Err(e) => {
            warn!(error = %e, "falling back to in-memory preferences");
            Arc::new(InMemoryPreferenceStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), DemoError> {
    init_tracing(&TelemetryConfig::default())?;

    let config = SyncConfig::from_env().with_ack_read_delay(Duration::from_millis(200));
    let store = Arc::new(InMemoryRemoteStore::new());
    seed(&store);

    let prefs = open_prefs(&config);
    let engine = SyncEngine::new(Arc::clone(&store), prefs, config)?;

    let view = engine.group_resolver().resolve_all(CUSTOMER, OBC, false).await?;
    info!(
        complete = view.is_complete(),
        groups = ?view.groups.value,
        forms = view.forms.index.form_count(),
        all_from_server = view.forms.all_from_server,
        "driver view resolved"
    );

    let check = engine.staleness_gate().check(CUSTOMER, OBC).await?;
    if let Some(refresh) = check.refresh {
        info!(outcome = ?refresh.wait().await, "index refresh finished");
    }

    let inbox = engine.aggregator(MessageFolder::Inbox);
    let mut snapshot = inbox.snapshot();
    inbox.load_page(CUSTOMER, VEHICLE, true).await?;
    tokio::time::timeout(Duration::from_secs(2), snapshot.wait_for(|s| !s.is_empty()))
        .await
        .map_err(|_| DemoError::Timeout("first page"))?
        .map_err(|_| DemoError::Timeout("first page"))?;
    inbox.load_page(CUSTOMER, VEHICLE, false).await?;
    tokio::time::timeout(Duration::from_secs(2), snapshot.wait_for(|s| s.len() == 25))
        .await
        .map_err(|_| DemoError::Timeout("second page"))?
        .map_err(|_| DemoError::Timeout("second page"))?;
    info!(records = inbox.current_snapshot().len(), "inbox loaded");

    let outcome = engine
        .acks()
        .acknowledge(CUSTOMER, VEHICLE, 25, AckSource::ListScreen)
        .await;
    info!(outcome = ?outcome, "newest message acknowledged");

    let trash = engine.trash_mover(Arc::new(StoreCollectionDeleter::new(Arc::clone(&store))));
    trash
        .move_to_trash(CUSTOMER, VEHICLE, MessageFolder::Inbox, "1")
        .await?;
    let response = trash.empty_trash(CUSTOMER, VEHICLE).await;
    info!(success = response.success, message = %response.message, "trash emptied");

    inbox.detach();
    engine.shutdown();
    Ok(())
}
