//! Soft delete: messages move to Trash as copy-then-delete; only emptying
//! the trash destroys them, through the bulk collection-delete service.

use std::sync::Arc;

use convoy_core::{paths, MessageFolder, StoreError, StoreResult, VehicleId};
use convoy_storage::{
    CollectionDeleter, DeleteResponse, FallbackReader, ReadPolicy, RemoteStore, WriteMode,
};
use tracing::{debug, info, warn};

use crate::events::{SyncEvent, SyncEvents};

pub struct TrashMover<S: RemoteStore> {
    store: Arc<S>,
    reader: FallbackReader<S>,
    deleter: Arc<dyn CollectionDeleter>,
    events: SyncEvents,
}

impl<S: RemoteStore> TrashMover<S> {
    pub fn new(store: Arc<S>, deleter: Arc<dyn CollectionDeleter>, events: SyncEvents) -> Self {
        Self {
            reader: FallbackReader::new(Arc::clone(&store)),
            store,
            deleter,
            events,
        }
    }

    pub async fn move_to_trash(
        &self,
        customer_id: &str,
        vehicle_id: VehicleId,
        from: MessageFolder,
        message_id: &str,
    ) -> StoreResult<()> {
        self.move_message(customer_id, vehicle_id, from, MessageFolder::Trash, message_id)
            .await
    }

    pub async fn restore(
        &self,
        customer_id: &str,
        vehicle_id: VehicleId,
        to: MessageFolder,
        message_id: &str,
    ) -> StoreResult<()> {
        self.move_message(customer_id, vehicle_id, MessageFolder::Trash, to, message_id)
            .await
    }

    /// Copy the message into `to`, then delete it from `from`. The copy
    /// keeps the document id and every field.
    pub async fn move_message(
        &self,
        customer_id: &str,
        vehicle_id: VehicleId,
        from: MessageFolder,
        to: MessageFolder,
        message_id: &str,
    ) -> StoreResult<()> {
        if from == to {
            debug!(message_id, folder = %from, "move within one folder ignored");
            return Ok(());
        }

        let source = paths::folder(customer_id, vehicle_id, from).child(message_id);
        let target = paths::folder(customer_id, vehicle_id, to).child(message_id);

        let doc = self
            .reader
            .read_document(&source, ReadPolicy::ForceServer)
            .await?
            .into_value()
            .ok_or_else(|| StoreError::not_found(source.as_str()))?;

        self.store.write(&target, doc.fields, WriteMode::Set).await?;
        self.store.delete(&source).await?;

        info!(customer_id, vehicle_id = %vehicle_id, message_id, from = %from, to = %to, "message moved");
        self.events.publish(SyncEvent::MessageMoved {
            customer_id: customer_id.to_string(),
            vehicle_id,
            message_id: message_id.to_string(),
            from,
            to,
        });
        Ok(())
    }

    /// Permanently delete the whole trash collection.
    pub async fn empty_trash(&self, customer_id: &str, vehicle_id: VehicleId) -> DeleteResponse {
        let trash = paths::folder(customer_id, vehicle_id, MessageFolder::Trash);
        let response = self.deleter.delete_collection(&trash).await;
        if response.success {
            info!(customer_id, vehicle_id = %vehicle_id, "trash emptied");
        } else {
            warn!(customer_id, vehicle_id = %vehicle_id, message = %response.message, "emptying trash failed");
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::{Document, DocumentPath};
    use convoy_storage::{InMemoryRemoteStore, StoreCollectionDeleter};
    use serde_json::json;

    const CID: &str = "1";
    const VID: VehicleId = VehicleId(2);

    fn mover(store: Arc<InMemoryRemoteStore>) -> (TrashMover<InMemoryRemoteStore>, SyncEvents) {
        let events = SyncEvents::new(8);
        let deleter = Arc::new(StoreCollectionDeleter::new(Arc::clone(&store)));
        (TrashMover::new(store, deleter, events.clone()), events)
    }

    #[tokio::test]
    async fn test_move_to_trash_copies_then_deletes() {
        let store = Arc::new(InMemoryRemoteStore::new());
        store.seed(Document::from_json(
            "customers/1/vehicles/2/inbox/7",
            json!({"asn": 7, "createdUnixTime": 100, "payload": {"text": "hi"}}),
        ));
        let (mover, events) = mover(Arc::clone(&store));
        let mut rx = events.subscribe();

        mover
            .move_to_trash(CID, VID, MessageFolder::Inbox, "7")
            .await
            .unwrap();

        assert!(store
            .server_document(&DocumentPath::new("customers/1/vehicles/2/inbox/7"))
            .is_none());
        let trashed = store
            .server_document(&DocumentPath::new("customers/1/vehicles/2/trash/7"))
            .unwrap();
        assert_eq!(trashed.get("payload"), Some(&json!({"text": "hi"})));
        assert_eq!(rx.recv().await.unwrap().event_type(), "MessageMoved");
    }

    #[tokio::test]
    async fn test_move_missing_message_is_not_found() {
        let (mover, _) = mover(Arc::new(InMemoryRemoteStore::new()));
        let err = mover
            .move_to_trash(CID, VID, MessageFolder::Sent, "nope")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_restore_and_empty_trash() {
        let store = Arc::new(InMemoryRemoteStore::new());
        for id in ["a", "b"] {
            store.seed(Document::from_json(
                format!("customers/1/vehicles/2/trash/{id}").as_str(),
                json!({"createdUnixTime": 1}),
            ));
        }
        let (mover, _) = mover(Arc::clone(&store));

        mover.restore(CID, VID, MessageFolder::Draft, "a").await.unwrap();
        assert!(store
            .server_document(&DocumentPath::new("customers/1/vehicles/2/drafts/a"))
            .is_some());

        let response = mover.empty_trash(CID, VID).await;
        assert!(response.success);
        assert!(store
            .server_document(&DocumentPath::new("customers/1/vehicles/2/trash/b"))
            .is_none());
    }
}
