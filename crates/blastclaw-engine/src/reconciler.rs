//! Status reconciliation.
//!
//! Events from the external channel arrive asynchronously, duplicated and
//! out of order. The reconciler funnels them one at a time into the store
//! (rank-monotonic, terminal override), treats unknown external ids as a
//! cache miss that forces a full reload, and coalesces Delivered/Read
//! bursts into a single debounced refresh against the backing store.

use std::time::Duration;

use tokio::sync::mpsc;

use blastclaw_core::types::{MessageStatus, StatusEvent};
use blastclaw_store::StatusApplied;

use crate::bus::{EngineEvent, EventBus};
use crate::debounce::DebounceTimer;
use crate::engine::SharedStore;

/// Quiet period before a burst of delivery updates triggers one
/// consolidated reload.
pub const RECONCILE_QUIET_MS: u64 = 2_000;

pub struct Reconciler {
    store: SharedStore,
    bus: EventBus,
    debounce: DebounceTimer,
}

impl Reconciler {
    pub fn new(store: SharedStore, bus: EventBus) -> Self {
        Self {
            store,
            bus,
            debounce: DebounceTimer::new(),
        }
    }

    /// Drain the inbound event queue until every sender hangs up.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<StatusEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
        tracing::debug!("Reconciler queue closed");
    }

    /// Apply one inbound event.
    pub async fn handle_event(&mut self, event: StatusEvent) {
        let applied = {
            let mut store = self.store.lock().await;
            store.apply_status(&event)
        };

        match applied {
            Ok(StatusApplied::Applied(message)) => {
                tracing::debug!(
                    "Status {} applied to message {} ({})",
                    event.status.as_str(),
                    message.id,
                    event.external_id
                );
                self.bus.emit(EngineEvent::MessageStatusUpdate {
                    external_id: event.external_id.clone(),
                    status: event.status,
                    timestamp: event.timestamp,
                });
                if matches!(event.status, MessageStatus::Delivered | MessageStatus::Read) {
                    self.schedule_refresh();
                }
            }
            Ok(StatusApplied::Stale) => {
                // Duplicate or out-of-order — silently ignored by design.
                tracing::trace!("Discarded stale event for {}", event.external_id);
            }
            Ok(StatusApplied::Unknown) => {
                tracing::info!(
                    "Unknown external id {} — reloading from backing store",
                    event.external_id
                );
                self.reload_now().await;
                // Retry once against the fresh cache; a second miss means
                // the message simply is not ours.
                let retried = {
                    let mut store = self.store.lock().await;
                    store.apply_status(&event)
                };
                match retried {
                    Ok(StatusApplied::Applied(_)) => {
                        self.bus.emit(EngineEvent::MessageStatusUpdate {
                            external_id: event.external_id.clone(),
                            status: event.status,
                            timestamp: event.timestamp,
                        });
                        if matches!(event.status, MessageStatus::Delivered | MessageStatus::Read) {
                            self.schedule_refresh();
                        }
                    }
                    Ok(_) => {
                        tracing::debug!(
                            "Event for {} still unresolved after reload, dropping",
                            event.external_id
                        );
                    }
                    Err(e) => tracing::warn!("Status retry failed: {e}"),
                }
            }
            Err(e) => tracing::warn!("Status application failed: {e}"),
        }
    }

    /// (Re)start the shared debounce timer; when the burst goes quiet,
    /// one consolidated reload runs.
    fn schedule_refresh(&mut self) {
        let store = self.store.clone();
        let bus = self.bus.clone();
        self.debounce
            .schedule(Duration::from_millis(RECONCILE_QUIET_MS), async move {
                let mut store = store.lock().await;
                match store.reload_messages() {
                    Ok(count) => {
                        bus.emit(EngineEvent::StoreRefreshed { message_count: count });
                        tracing::debug!("Debounced refresh complete ({count} messages)");
                    }
                    Err(e) => tracing::warn!("Debounced refresh failed: {e}"),
                }
            });
    }

    async fn reload_now(&self) {
        let mut store = self.store.lock().await;
        match store.reload_messages() {
            Ok(count) => {
                self.bus.emit(EngineEvent::StoreRefreshed { message_count: count });
            }
            Err(e) => tracing::warn!("Reload failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastclaw_core::types::{NewContact, NewTemplate};
    use blastclaw_store::CampaignStore;
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn status_event(external_id: &str, status: MessageStatus) -> StatusEvent {
        StatusEvent {
            external_id: external_id.into(),
            status,
            timestamp: Utc::now(),
            sent_time: None,
            delivered_time: None,
            read_time: None,
            error_message: None,
        }
    }

    async fn seeded() -> (SharedStore, String) {
        let mut store = CampaignStore::open_in_memory().unwrap();
        let contact = store
            .create_contact(NewContact {
                phone_number: "5551".into(),
                name: "Ada".into(),
                surname: String::new(),
                email: None,
                birthday: None,
                source: "manual".into(),
                notes: None,
            })
            .unwrap();
        let template = store
            .create_template(NewTemplate {
                name: "t".into(),
                content: "hi".into(),
                image_path: None,
            })
            .unwrap();
        let msg = store
            .schedule_message(&contact, &template, Utc::now())
            .unwrap();
        store.mark_dispatched(&msg.id, "wamid.R", Utc::now()).unwrap();
        (Arc::new(Mutex::new(store)), msg.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_refresh() {
        let (store, _) = seeded().await;
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut reconciler = Reconciler::new(store, bus);

        reconciler
            .handle_event(status_event("wamid.R", MessageStatus::Delivered))
            .await;
        tokio::time::advance(Duration::from_millis(500)).await;
        reconciler
            .handle_event(status_event("wamid.R", MessageStatus::Read))
            .await;

        // one status update per accepted event
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::MessageStatusUpdate { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::MessageStatusUpdate { .. }
        ));

        // quiet period elapses once → exactly one refresh
        tokio::time::advance(Duration::from_millis(RECONCILE_QUIET_MS + 100)).await;
        tokio::task::yield_now().await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StoreRefreshed { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_events_do_not_refresh_again() {
        let (store, _) = seeded().await;
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut reconciler = Reconciler::new(store, bus);

        reconciler
            .handle_event(status_event("wamid.R", MessageStatus::Delivered))
            .await;
        let _ = rx.recv().await;
        tokio::time::advance(Duration::from_millis(RECONCILE_QUIET_MS + 100)).await;
        tokio::task::yield_now().await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StoreRefreshed { .. }
        ));

        // the same event again is stale: no status update, no new timer
        reconciler
            .handle_event(status_event("wamid.R", MessageStatus::Delivered))
            .await;
        tokio::time::advance(Duration::from_millis(RECONCILE_QUIET_MS + 100)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_miss_reloads_and_recovers() {
        // Two store instances over the same database file: the writer
        // dispatches a message the reconciler's instance has never cached.
        let dir = std::env::temp_dir().join("blastclaw-reconciler-miss-test");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("test.db");
        let stale = CampaignStore::open(&path).unwrap();

        {
            let mut writer = CampaignStore::open(&path).unwrap();
            let contact = writer
                .create_contact(NewContact {
                    phone_number: "5551".into(),
                    name: "Ada".into(),
                    surname: String::new(),
                    email: None,
                    birthday: None,
                    source: "manual".into(),
                    notes: None,
                })
                .unwrap();
            let template = writer
                .create_template(NewTemplate {
                    name: "t".into(),
                    content: "hi".into(),
                    image_path: None,
                })
                .unwrap();
            let msg = writer
                .schedule_message(&contact, &template, Utc::now())
                .unwrap();
            writer.mark_dispatched(&msg.id, "wamid.R", Utc::now()).unwrap();
        }

        let store: SharedStore = Arc::new(Mutex::new(stale));
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut reconciler = Reconciler::new(store.clone(), bus);

        reconciler
            .handle_event(status_event("wamid.R", MessageStatus::Delivered))
            .await;

        // cache-miss reload first, then the applied update
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StoreRefreshed { message_count: 1 }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::MessageStatusUpdate { .. }
        ));
        let guard = store.lock().await;
        let all = guard.list_messages();
        assert_eq!(all[0].status, MessageStatus::Delivered);
        drop(guard);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_event_for_foreign_message_is_dropped() {
        let (store, _) = seeded().await;
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut reconciler = Reconciler::new(store, bus);

        reconciler
            .handle_event(status_event("wamid.someone-elses", MessageStatus::Read))
            .await;
        // only the cache-miss reload event, no status update
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StoreRefreshed { .. }
        ));
        assert!(rx.try_recv().is_err());
    }
}
