//! Engine event bus.
//!
//! A broadcast channel carrying everything the presentation layer needs
//! to observe: dispatches, status updates, and bulk-operation progress.
//! The tagged JSON encoding matches the event names clients subscribe to
//! over the gateway WebSocket.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use blastclaw_core::types::{
    DeleteOutcome, ImportOutcome, MessageStatus, ScheduledMessage,
};

const BUS_CAPACITY: usize = 256;

/// Everything observable about the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// A message was handed to the external channel.
    MessageSent { message: ScheduledMessage },
    /// A status event was accepted by the reconciler.
    #[serde(rename_all = "camelCase")]
    MessageStatusUpdate {
        external_id: String,
        status: MessageStatus,
        timestamp: DateTime<Utc>,
    },
    /// Chunk progress of an import commit.
    ImportProgress {
        #[serde(flatten)]
        outcome: ImportOutcome,
    },
    /// Chunk progress of a bulk delete.
    DeleteProgress {
        #[serde(flatten)]
        outcome: DeleteOutcome,
    },
    /// A consolidated reload against the backing store completed.
    #[serde(rename_all = "camelCase")]
    StoreRefreshed { message_count: usize },
}

/// Cloneable handle on the broadcast bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Emit an event. Nobody listening is fine — events are advisory.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(EngineEvent::StoreRefreshed { message_count: 3 });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::StoreRefreshed { message_count: 3 }));
    }

    #[test]
    fn test_event_json_tags() {
        let json = serde_json::to_value(EngineEvent::DeleteProgress {
            outcome: DeleteOutcome { deleted: 5, errors: 1, total: 10 },
        })
        .unwrap();
        assert_eq!(json["type"], "delete-progress");
        assert_eq!(json["deleted"], 5);

        let json = serde_json::to_value(EngineEvent::MessageStatusUpdate {
            external_id: "wamid.X".into(),
            status: MessageStatus::Delivered,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "message-status-update");
        assert_eq!(json["externalId"], "wamid.X");
        assert_eq!(json["status"], "DELIVERED");
    }
}
