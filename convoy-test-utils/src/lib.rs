//! Convoy Test Utilities
//!
//! Shared test infrastructure for the Convoy workspace:
//! - Fixtures that seed an in-memory store with a driver scenario
//! - `RecordingStore`, a store wrapper that logs every mutation in order
//! - Proptest generators for messages, change sequences and markers

pub use convoy_storage::{InMemoryPreferenceStore, InMemoryRemoteStore};

pub use convoy_core::{
    paths, Document, DocumentPath, Fields, GroupId, MarkerKind, MessageFolder, ObcId, ReadMode,
    StoreResult, VehicleId,
};

use std::sync::Mutex;

use async_trait::async_trait;
use convoy_core::constants::{
    FIELD_ASN, FIELD_CREATED_TIME, FIELD_IS_DELIVERED, FIELD_IS_READ, FIELD_LAST_MODIFIED,
    FIELD_PAYLOAD,
};
use convoy_storage::{
    ChangeBatch, ChangeKind, ChangeStream, DocumentChange, PageQuery, RemoteStore,
    UpdatePredicate, WriteMode,
};
use serde_json::{json, Value};
use tokio::time::Instant;

// ============================================================================
// FIXTURES
// ============================================================================

pub const CUSTOMER_ID: &str = "10119";
pub const OBC_ID: ObcId = ObcId(99);
pub const VEHICLE_ID: VehicleId = VehicleId(500);
pub const GROUP_ID: GroupId = GroupId(7);
pub const FORM_ID: i64 = 11;

pub fn seed_unit(store: &InMemoryRemoteStore, customer_id: &str, obc_id: ObcId, vehicle_id: VehicleId) {
    store.seed(Document::from_json(
        paths::unit(customer_id, obc_id),
        json!({"vid": vehicle_id.get(), "cid": customer_id}),
    ));
}

/// One membership document listing `groups` with their member flags.
pub fn seed_membership(
    store: &InMemoryRemoteStore,
    customer_id: &str,
    vehicle_id: VehicleId,
    groups: &[(GroupId, bool)],
) {
    let gid: serde_json::Map<String, Value> = groups
        .iter()
        .map(|(group, member)| (group.get().to_string(), Value::Bool(*member)))
        .collect();
    store.seed(Document::from_json(
        paths::vehicle_groups(customer_id, vehicle_id).child("membership"),
        json!({ "gid": gid }),
    ));
}

/// A form that passes the driver visibility filter.
pub fn seed_form(store: &InMemoryRemoteStore, customer_id: &str, group_id: GroupId, form_id: i64) {
    store.seed(Document::from_json(
        paths::group_forms(customer_id, group_id).child(form_id),
        json!({
            "formId": form_id,
            "formClass": 2,
            "name": format!("form {form_id}"),
            "inUseBits": 1,
            "driverOriginated": 1,
        }),
    ));
}

pub fn seed_user(store: &InMemoryRemoteStore, customer_id: &str, group_id: GroupId, uid: &str) {
    store.seed(Document::from_json(
        paths::group_users(customer_id, group_id).child(uid),
        json!({"uid": uid, "username": uid, "active": true, "addressBookEligible": true}),
    ));
}

pub fn seed_marker(store: &InMemoryRemoteStore, customer_id: &str, kind: MarkerKind, value: i64) {
    store.seed(Document::from_json(
        paths::marker(customer_id, kind),
        json!({ FIELD_LAST_MODIFIED: value }),
    ));
}

/// An inbox message keyed by `asn`, created at `1_700_000_000 + asn`.
pub fn inbox_message(customer_id: &str, vehicle_id: VehicleId, asn: i64) -> Document {
    Document::from_json(
        paths::folder(customer_id, vehicle_id, MessageFolder::Inbox).child(asn),
        json!({
            FIELD_ASN: asn,
            FIELD_CREATED_TIME: 1_700_000_000 + asn,
            FIELD_PAYLOAD: {"text": format!("message {asn}")},
        }),
    )
}

pub fn seed_inbox(
    store: &InMemoryRemoteStore,
    customer_id: &str,
    vehicle_id: VehicleId,
    asns: impl IntoIterator<Item = i64>,
) {
    for asn in asns {
        store.seed(inbox_message(customer_id, vehicle_id, asn));
    }
}

/// Customer 10119, unit 99 on vehicle 500, member of group 7 (not of 8),
/// with one visible form and one address-book user in group 7.
pub fn seed_driver_scenario(store: &InMemoryRemoteStore) {
    seed_unit(store, CUSTOMER_ID, OBC_ID, VEHICLE_ID);
    seed_membership(store, CUSTOMER_ID, VEHICLE_ID, &[(GROUP_ID, true), (GroupId(8), false)]);
    seed_form(store, CUSTOMER_ID, GROUP_ID, FORM_ID);
    seed_user(store, CUSTOMER_ID, GROUP_ID, "dispatch");
}

// ============================================================================
// RECORDING STORE
// ============================================================================

/// A mutation seen by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Write {
        path: DocumentPath,
        fields: Fields,
        mode: WriteMode,
    },
    Create {
        path: DocumentPath,
        fields: Fields,
        created: bool,
    },
    ConditionalUpdate {
        path: DocumentPath,
        field: String,
        applied: bool,
    },
    Delete {
        path: DocumentPath,
    },
}

impl Op {
    pub fn path(&self) -> &DocumentPath {
        match self {
            Self::Write { path, .. }
            | Self::Create { path, .. }
            | Self::ConditionalUpdate { path, .. }
            | Self::Delete { path } => path,
        }
    }
}

/// Wraps a store and records every successful mutation with the (tokio)
/// time it happened. Reads and watches pass straight through.
pub struct RecordingStore<S> {
    inner: S,
    ops: Mutex<Vec<(Instant, Op)>>,
}

impl<S: RemoteStore> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn ops(&self) -> Vec<Op> {
        self.timed_ops().into_iter().map(|(_, op)| op).collect()
    }

    pub fn timed_ops(&self) -> Vec<(Instant, Op)> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    /// Conditional updates that actually changed `field`.
    pub fn applied_flips(&self, field: &str) -> usize {
        self.ops()
            .iter()
            .filter(|op| {
                matches!(op, Op::ConditionalUpdate { field: f, applied: true, .. } if f == field)
            })
            .count()
    }

    /// Documents at `path` that a `create` call actually brought into being.
    pub fn creations(&self, path: &DocumentPath) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, Op::Create { path: p, created: true, .. } if p == path))
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.clear();
        }
    }

    fn record(&self, op: Op) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.push((Instant::now(), op));
        }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RecordingStore<S> {
    async fn read_document(&self, path: &DocumentPath, mode: ReadMode) -> StoreResult<Option<Document>> {
        self.inner.read_document(path, mode).await
    }

    async fn read_collection(&self, path: &DocumentPath, mode: ReadMode) -> StoreResult<Vec<Document>> {
        self.inner.read_collection(path, mode).await
    }

    async fn is_cache_empty(&self, path: &DocumentPath) -> bool {
        self.inner.is_cache_empty(path).await
    }

    async fn watch(&self, query: PageQuery) -> StoreResult<ChangeStream> {
        self.inner.watch(query).await
    }

    async fn write(&self, path: &DocumentPath, fields: Fields, mode: WriteMode) -> StoreResult<()> {
        self.inner.write(path, fields.clone(), mode).await?;
        self.record(Op::Write {
            path: path.clone(),
            fields,
            mode,
        });
        Ok(())
    }

    async fn create(&self, path: &DocumentPath, fields: Fields) -> StoreResult<bool> {
        let created = self.inner.create(path, fields.clone()).await?;
        self.record(Op::Create {
            path: path.clone(),
            fields,
            created,
        });
        Ok(created)
    }

    async fn conditional_update(
        &self,
        path: &DocumentPath,
        field: &str,
        predicate: UpdatePredicate,
        new_value: Value,
    ) -> StoreResult<bool> {
        let applied = self
            .inner
            .conditional_update(path, field, predicate, new_value)
            .await?;
        self.record(Op::ConditionalUpdate {
            path: path.clone(),
            field: field.to_string(),
            applied,
        });
        Ok(applied)
    }

    async fn delete(&self, path: &DocumentPath) -> StoreResult<()> {
        self.inner.delete(path).await?;
        self.record(Op::Delete { path: path.clone() });
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// One step of a change sequence against a small set of documents.
    #[derive(Debug, Clone, PartialEq)]
    pub enum ChangeOp {
        /// Add or modify document `doc` so that it sits at `asn`.
        Upsert { doc: u8, asn: i64, read: bool },
        Remove { doc: u8 },
    }

    pub fn arb_asn() -> impl Strategy<Value = i64> {
        1i64..10_000
    }

    /// Ops over at most eight documents and sixteen keys, so collisions
    /// and key moves are common.
    pub fn arb_change_op() -> impl Strategy<Value = ChangeOp> {
        prop_oneof![
            3 => (0u8..8, 1i64..16, any::<bool>())
                .prop_map(|(doc, asn, read)| ChangeOp::Upsert { doc, asn, read }),
            1 => (0u8..8).prop_map(|doc| ChangeOp::Remove { doc }),
        ]
    }

    pub fn arb_change_ops(max_len: usize) -> impl Strategy<Value = Vec<ChangeOp>> {
        prop::collection::vec(arb_change_op(), 0..max_len)
    }

    /// Server marker value: zero (absent) or a plausible unix time.
    pub fn arb_marker() -> impl Strategy<Value = i64> {
        prop_oneof![
            1 => Just(0i64),
            4 => 1_600_000_000i64..1_800_000_000,
        ]
    }

    pub fn arb_ack_flags() -> impl Strategy<Value = (bool, bool)> {
        any::<(bool, bool)>()
    }

    pub fn change_doc_path(doc: u8) -> DocumentPath {
        paths::folder(CUSTOMER_ID, VEHICLE_ID, MessageFolder::Inbox).child(format!("doc-{doc}"))
    }

    /// A single-change batch for `op`, shaped like a live listener delivery.
    pub fn change_op_batch(op: &ChangeOp) -> ChangeBatch {
        let (kind, document) = match op {
            ChangeOp::Upsert { doc, asn, read } => (
                ChangeKind::Modified,
                Document::from_json(
                    change_doc_path(*doc),
                    json!({ FIELD_ASN: asn, FIELD_IS_READ: read, FIELD_IS_DELIVERED: true }),
                ),
            ),
            ChangeOp::Remove { doc } => (
                ChangeKind::Removed,
                Document::from_json(change_doc_path(*doc), json!({})),
            ),
        };
        ChangeBatch {
            documents: vec![document.clone()],
            changes: vec![DocumentChange { kind, document }],
        }
    }
}
