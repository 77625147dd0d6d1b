//! Delivery/Read Acknowledgment Sequencer
//!
//! Moves an inbox message through `Unacknowledged -> DeliveredOnly ->
//! ReadAndDelivered`, never backwards. A message with neither flag gets the
//! full sequence: delivered event, delivered flag, a short pause, read
//! event, read flag. Some producers skip the delivery handshake, and the
//! backend reports "sent on" from the order of these writes.
//!
//! Event documents live at fixed paths and are only ever created, never
//! overwritten, so whichever attempt creates one owns that confirmation.
//! Flag flips are conditional (only when absent or false). Concurrent
//! attempts from the list screen, a notification tap and the fallback sweep
//! therefore send each confirmation once. A message already marked read but
//! never delivered only gets the delivery handshake.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use convoy_core::constants::{
    FIELD_ACK_AT, FIELD_ACK_EVENT, FIELD_ACK_SOURCE, FIELD_IS_DELIVERED, FIELD_IS_READ,
};
use convoy_core::decode::decode_message;
use convoy_core::{
    paths, AckEventKind, AckSource, AckState, DocumentPath, Fields, MessageFolder, StoreError,
    SyncConfig, VehicleId,
};
use convoy_storage::{FallbackReader, ReadPolicy, RemoteStore, UpdatePredicate};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::events::{SyncEvent, SyncEvents};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Writes were issued; the message went from `from` to `to`.
    Advanced { from: AckState, to: AckState },
    /// Both flags were already set.
    AlreadyAcknowledged,
    /// Another call for the same message is running in this process.
    InFlight,
    /// The message no longer exists (moved or deleted concurrently).
    Gone,
    Failed(String),
}

/// Removes the in-flight entry when the sequence ends or is dropped.
struct InFlightGuard {
    in_flight: Arc<DashMap<DocumentPath, AckSource>>,
    path: DocumentPath,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.path);
    }
}

enum Step {
    Done,
    Gone,
}

pub struct AckSequencer<S: RemoteStore> {
    store: Arc<S>,
    reader: FallbackReader<S>,
    read_delay: Duration,
    events: SyncEvents,
    in_flight: Arc<DashMap<DocumentPath, AckSource>>,
}

impl<S: RemoteStore> Clone for AckSequencer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            reader: self.reader.clone(),
            read_delay: self.read_delay,
            events: self.events.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<S: RemoteStore> AckSequencer<S> {
    pub fn new(store: Arc<S>, config: &SyncConfig, events: SyncEvents) -> Self {
        Self {
            reader: FallbackReader::new(Arc::clone(&store)),
            store,
            read_delay: config.ack_read_delay,
            events,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Acknowledge inbox message `asn`. Never fails past this boundary.
    pub async fn acknowledge(
        &self,
        customer_id: &str,
        vehicle_id: VehicleId,
        asn: i64,
        source: AckSource,
    ) -> AckOutcome {
        let path = paths::folder(customer_id, vehicle_id, MessageFolder::Inbox).child(asn);

        let _guard = match self.in_flight.entry(path.clone()) {
            Entry::Occupied(running) => {
                debug!(path = %path, source = source.as_str(), running = running.get().as_str(), "ack already in flight");
                return AckOutcome::InFlight;
            }
            Entry::Vacant(slot) => {
                slot.insert(source);
                InFlightGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    path: path.clone(),
                }
            }
        };

        let outcome = self.run(customer_id, vehicle_id, asn, source, &path).await;
        match &outcome {
            AckOutcome::Advanced { to, .. } => {
                self.events.publish(SyncEvent::AckCompleted {
                    customer_id: customer_id.to_string(),
                    vehicle_id,
                    asn,
                    state: *to,
                });
            }
            AckOutcome::Failed(reason) => {
                error!(customer_id, vehicle_id = %vehicle_id, asn, source = source.as_str(), reason = %reason, "acknowledgment failed");
            }
            _ => {}
        }
        outcome
    }

    async fn run(
        &self,
        customer_id: &str,
        vehicle_id: VehicleId,
        asn: i64,
        source: AckSource,
        path: &DocumentPath,
    ) -> AckOutcome {
        let doc = match self.reader.read_document(path, ReadPolicy::ForceServer).await {
            Ok(fetched) => match fetched.into_value() {
                Some(doc) => doc,
                None => {
                    debug!(path = %path, "ack target missing");
                    return AckOutcome::Gone;
                }
            },
            Err(e) => return AckOutcome::Failed(e.to_string()),
        };

        let record = match decode_message(&doc, MessageFolder::Inbox) {
            Ok(record) => record,
            Err(e) => return AckOutcome::Failed(e.to_string()),
        };
        let from = record.ack_state();

        let result = match from {
            AckState::ReadAndDelivered => return AckOutcome::AlreadyAcknowledged,
            AckState::DeliveredOnly => {
                self.confirm(customer_id, vehicle_id, asn, source, path, AckEventKind::Read)
                    .await
            }
            AckState::Unacknowledged => {
                match self
                    .confirm(customer_id, vehicle_id, asn, source, path, AckEventKind::Delivered)
                    .await
                {
                    Ok(Step::Done) if record.is_read => {
                        debug!(path = %path, "message already read, delivery handshake only");
                        Ok(Step::Done)
                    }
                    Ok(Step::Done) => {
                        tokio::time::sleep(self.read_delay).await;
                        self.confirm(customer_id, vehicle_id, asn, source, path, AckEventKind::Read)
                            .await
                    }
                    other => other,
                }
            }
        };

        match result {
            Ok(Step::Done) => {
                info!(customer_id, vehicle_id = %vehicle_id, asn, source = source.as_str(), from = ?from, "message acknowledged");
                AckOutcome::Advanced {
                    from,
                    to: AckState::ReadAndDelivered,
                }
            }
            Ok(Step::Gone) => AckOutcome::Gone,
            Err(e) => AckOutcome::Failed(e.to_string()),
        }
    }

    /// Create the confirmation event, then flip the matching flag.
    ///
    /// An event that already exists was sent by an earlier or concurrent
    /// attempt; it is left alone and only the flag flip is retried.
    async fn confirm(
        &self,
        customer_id: &str,
        vehicle_id: VehicleId,
        asn: i64,
        source: AckSource,
        message: &DocumentPath,
        kind: AckEventKind,
    ) -> Result<Step, StoreError> {
        let event_path = paths::ack_event(customer_id, vehicle_id, asn, kind);
        let mut fields = Fields::new();
        fields.insert(FIELD_ACK_EVENT.to_string(), json!(kind.as_str()));
        fields.insert(FIELD_ACK_SOURCE.to_string(), json!(source.as_str()));
        fields.insert(FIELD_ACK_AT.to_string(), json!(Utc::now().timestamp_millis()));
        if !self.store.create(&event_path, fields).await? {
            debug!(path = %event_path, "confirmation event already sent");
        }

        let flag = match kind {
            AckEventKind::Delivered => FIELD_IS_DELIVERED,
            AckEventKind::Read => FIELD_IS_READ,
        };
        match self
            .store
            .conditional_update(message, flag, UpdatePredicate::AbsentOrFalse, Value::Bool(true))
            .await
        {
            Ok(applied) => {
                debug!(path = %message, flag, applied, "ack flag update");
                Ok(Step::Done)
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %message, flag, "ack target vanished during update");
                Ok(Step::Gone)
            }
            Err(e) => Err(e),
        }
    }
}
