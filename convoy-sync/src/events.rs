//! Sync Event Bus
//!
//! Process-wide broadcast of engine signals: store faults surfaced to the UI
//! as a degraded-mode banner, background refresh progress, completed
//! acknowledgments and trash moves.

use convoy_core::{AckState, CustomerId, MessageFolder, ObcId, VehicleId};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    // ========================================================================
    // STALENESS / REFRESH
    // ========================================================================
    /// Marker fetch failed; the caller keeps using cached indexes.
    StoreFault {
        customer_id: CustomerId,
        obc_id: ObcId,
        reason: String,
    },

    RefreshStarted {
        task_id: Uuid,
        customer_id: CustomerId,
    },

    RefreshCompleted {
        task_id: Uuid,
        customer_id: CustomerId,
        forms: usize,
        users: usize,
    },

    RefreshFailed {
        task_id: Uuid,
        customer_id: CustomerId,
        reason: String,
    },

    // ========================================================================
    // MESSAGES
    // ========================================================================
    AckCompleted {
        customer_id: CustomerId,
        vehicle_id: VehicleId,
        asn: i64,
        state: AckState,
    },

    MessageMoved {
        customer_id: CustomerId,
        vehicle_id: VehicleId,
        message_id: String,
        from: MessageFolder,
        to: MessageFolder,
    },
}

impl SyncEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StoreFault { .. } => "StoreFault",
            Self::RefreshStarted { .. } => "RefreshStarted",
            Self::RefreshCompleted { .. } => "RefreshCompleted",
            Self::RefreshFailed { .. } => "RefreshFailed",
            Self::AckCompleted { .. } => "AckCompleted",
            Self::MessageMoved { .. } => "MessageMoved",
        }
    }

    pub fn customer_id(&self) -> &str {
        match self {
            Self::StoreFault { customer_id, .. }
            | Self::RefreshStarted { customer_id, .. }
            | Self::RefreshCompleted { customer_id, .. }
            | Self::RefreshFailed { customer_id, .. }
            | Self::AckCompleted { customer_id, .. }
            | Self::MessageMoved { customer_id, .. } => customer_id,
        }
    }
}

/// Cloneable handle to the broadcast channel.
#[derive(Clone)]
pub struct SyncEvents {
    tx: broadcast::Sender<SyncEvent>,
}

impl SyncEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Non-blocking; events published with no subscriber are dropped.
    pub fn publish(&self, event: SyncEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "sync event published"),
            Err(_) => debug!(event_type, "no subscribers for sync event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Events for one customer as a stream. Lagged gaps are skipped.
    pub fn stream_for(&self, customer_id: impl Into<CustomerId>) -> impl Stream<Item = SyncEvent> {
        let customer_id = customer_id.into();
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let keep = match item {
                Ok(event) if event.customer_id() == customer_id => Some(event),
                _ => None,
            };
            futures_util::future::ready(keep)
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new(convoy_core::constants::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(customer: &str) -> SyncEvent {
        SyncEvent::StoreFault {
            customer_id: customer.to_string(),
            obc_id: ObcId(99),
            reason: "offline".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let events = SyncEvents::new(8);
        let mut rx1 = events.subscribe();
        let mut rx2 = events.subscribe();
        events.publish(fault("10119"));
        assert_eq!(rx1.recv().await.unwrap(), fault("10119"));
        assert_eq!(rx2.recv().await.unwrap(), fault("10119"));
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let events = SyncEvents::new(8);
        events.publish(fault("1"));
        assert_eq!(events.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_filters_by_customer() {
        let events = SyncEvents::new(8);
        let stream = events.stream_for("10119");
        futures_util::pin_mut!(stream);
        events.publish(fault("other"));
        events.publish(fault("10119"));
        let next = stream.next().await.unwrap();
        assert_eq!(next.customer_id(), "10119");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(fault("1")).unwrap();
        assert_eq!(json["type"], "StoreFault");
        assert_eq!(json["obc_id"], 99);
    }
}
