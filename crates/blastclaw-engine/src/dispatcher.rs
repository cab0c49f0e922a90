//! Dispatch loop — hands due messages to the external channel.
//!
//! One message at a time: the batch planner already spaced the slots, so
//! the loop only has to respect the window gate and record outcomes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use blastclaw_core::error::Result;
use blastclaw_core::traits::Channel;
use blastclaw_core::types::{MessageStatus, SendWindow};
use blastclaw_scheduler::next_send_slot;

use crate::bus::{EngineEvent, EventBus};
use crate::engine::SharedStore;

/// How often the dispatcher checks for due messages.
pub const DISPATCH_CHECK_SECS: u64 = 10;

pub struct Dispatcher {
    store: SharedStore,
    channel: Arc<dyn Channel>,
    bus: EventBus,
    default_window: SendWindow,
}

impl Dispatcher {
    pub fn new(
        store: SharedStore,
        channel: Arc<dyn Channel>,
        bus: EventBus,
        default_window: SendWindow,
    ) -> Self {
        Self {
            store,
            channel,
            bus,
            default_window,
        }
    }

    /// Spawn the dispatch loop as a background tokio task.
    pub async fn run(self, check_interval_secs: u64) {
        tracing::info!(
            "Dispatcher started via '{}' (check every {check_interval_secs}s)",
            self.channel.name()
        );
        let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs));
        loop {
            interval.tick().await;
            match self.tick(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Dispatched {n} message(s)"),
                Err(e) => tracing::warn!("Dispatch tick failed: {e}"),
            }
        }
    }

    /// One pass: if the window is open at `now`, send everything due.
    /// Returns the number of successful handoffs.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let window = {
            let store = self.store.lock().await;
            store.send_window(&self.default_window)?
        };
        if !window.is_active {
            return Ok(0);
        }
        // Inside the window, `next_send_slot` is the identity.
        if next_send_slot(&window, now)? != now {
            return Ok(0);
        }

        let due = {
            let store = self.store.lock().await;
            store.due_messages(now)
        };
        if due.is_empty() {
            return Ok(0);
        }

        let mut sent = 0;
        for message in due {
            let contact = {
                let store = self.store.lock().await;
                store.get_contact(&message.contact_id)
            };
            let contact = match contact {
                Ok(contact) => contact,
                Err(e) => {
                    tracing::warn!("Message {} has no contact: {e}", message.id);
                    let mut store = self.store.lock().await;
                    let _ = store.mark_failed(&message.id, &format!("contact missing: {e}"));
                    continue;
                }
            };

            {
                let mut store = self.store.lock().await;
                // A cancel may have landed since the due snapshot — only a
                // message that actually reached Pending goes out.
                let claimed = store.mark_pending(&message.id)?;
                if claimed.status != MessageStatus::Pending {
                    continue;
                }
            }

            let outcome = self
                .channel
                .send_text(
                    &contact.phone_number,
                    &message.content_snapshot,
                    message.image_path_snapshot.as_deref(),
                )
                .await;

            let mut store = self.store.lock().await;
            match outcome {
                Ok(external_id) => {
                    let dispatched = store.mark_dispatched(&message.id, &external_id, now)?;
                    self.bus.emit(EngineEvent::MessageSent { message: dispatched });
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!("Send failed for message {}: {e}", message.id);
                    let _ = store.mark_failed(&message.id, &e.to_string());
                }
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastclaw_channels::MockChannel;
    use blastclaw_core::types::{MessageStatus, NewContact, NewTemplate};
    use blastclaw_store::CampaignStore;
    use chrono::TimeZone;
    use tokio::sync::Mutex;

    fn open_window() -> SendWindow {
        SendWindow {
            active_days: vec![1, 2, 3, 4, 5, 6, 7],
            start_minute: 0,
            end_minute: 1440,
            message_interval_secs: 5,
            is_active: true,
        }
    }

    fn seeded(phones: &[&str]) -> (SharedStore, Vec<String>) {
        let mut store = CampaignStore::open_in_memory().unwrap();
        let template = store
            .create_template(NewTemplate {
                name: "t".into(),
                content: "Hi {name}!".into(),
                image_path: None,
            })
            .unwrap();
        let mut message_ids = Vec::new();
        for (i, phone) in phones.iter().enumerate() {
            let contact = store
                .create_contact(NewContact {
                    phone_number: (*phone).into(),
                    name: format!("C{i}"),
                    surname: String::new(),
                    email: None,
                    birthday: None,
                    source: "manual".into(),
                    notes: None,
                })
                .unwrap();
            let msg = store
                .schedule_message(
                    &contact,
                    &template,
                    Utc.timestamp_opt(1_000 + i as i64, 0).unwrap(),
                )
                .unwrap();
            message_ids.push(msg.id);
        }
        (SharedStore::new(Mutex::new(store)), message_ids)
    }

    #[tokio::test]
    async fn test_tick_sends_due_messages() {
        let (store, ids) = seeded(&["5551", "5552"]);
        let channel = Arc::new(MockChannel::new());
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let dispatcher =
            Dispatcher::new(store.clone(), channel.clone(), bus, open_window());

        let now = Utc.timestamp_opt(2_000, 0).unwrap();
        let sent = dispatcher.tick(now).await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(channel.sent().len(), 2);
        assert_eq!(channel.sent()[0].body, "Hi C0!");

        let guard = store.lock().await;
        for id in &ids {
            let msg = guard.get_message(id).unwrap();
            assert_eq!(msg.status, MessageStatus::Sent);
            assert!(msg.external_id.is_some());
            assert_eq!(msg.sent_time, Some(now));
        }
        drop(guard);
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::MessageSent { .. }
        ));

        // a second tick finds nothing due
        assert_eq!(dispatcher.tick(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tick_respects_window() {
        let (store, ids) = seeded(&["5551"]);
        let channel = Arc::new(MockChannel::new());
        // weekend-only window
        let window = SendWindow {
            active_days: vec![6, 7],
            ..open_window()
        };
        let dispatcher = Dispatcher::new(store.clone(), channel.clone(), EventBus::new(), window);

        // 2026-02-25 is a Wednesday
        let now = Utc.with_ymd_and_hms(2026, 2, 25, 12, 0, 0).unwrap();
        assert_eq!(dispatcher.tick(now).await.unwrap(), 0);
        assert!(channel.sent().is_empty());
        let guard = store.lock().await;
        assert_eq!(
            guard.get_message(&ids[0]).unwrap().status,
            MessageStatus::Scheduled
        );
    }

    #[tokio::test]
    async fn test_inactive_window_pauses_sending() {
        let (store, _) = seeded(&["5551"]);
        let channel = Arc::new(MockChannel::new());
        let window = SendWindow { is_active: false, ..open_window() };
        let dispatcher = Dispatcher::new(store, channel.clone(), EventBus::new(), window);
        assert_eq!(dispatcher.tick(Utc::now()).await.unwrap(), 0);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn test_canceled_message_is_never_sent() {
        let (store, ids) = seeded(&["5551"]);
        {
            let mut guard = store.lock().await;
            guard.cancel_message(&ids[0]).unwrap();
        }
        let channel = Arc::new(MockChannel::new());
        let dispatcher =
            Dispatcher::new(store.clone(), channel.clone(), EventBus::new(), open_window());

        assert_eq!(dispatcher.tick(Utc::now()).await.unwrap(), 0);
        assert!(channel.sent().is_empty());
        let guard = store.lock().await;
        assert_eq!(
            guard.get_message(&ids[0]).unwrap().status,
            MessageStatus::Canceled
        );
    }

    #[tokio::test]
    async fn test_send_failure_marks_failed_and_continues() {
        let (store, ids) = seeded(&["666", "5552"]);
        let channel = Arc::new(MockChannel::new());
        channel.fail_sends_to("666");
        let dispatcher =
            Dispatcher::new(store.clone(), channel.clone(), EventBus::new(), open_window());

        let sent = dispatcher.tick(Utc::now()).await.unwrap();
        assert_eq!(sent, 1);

        let guard = store.lock().await;
        let failed = guard.get_message(&ids[0]).unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("refused"));
        assert_eq!(guard.get_message(&ids[1]).unwrap().status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_retry_reenters_dispatch() {
        let (store, ids) = seeded(&["666"]);
        let channel = Arc::new(MockChannel::new());
        channel.fail_sends_to("666");
        let dispatcher =
            Dispatcher::new(store.clone(), channel.clone(), EventBus::new(), open_window());

        dispatcher.tick(Utc::now()).await.unwrap();
        {
            let mut guard = store.lock().await;
            assert_eq!(guard.get_message(&ids[0]).unwrap().status, MessageStatus::Failed);
            guard.retry_message(&ids[0]).unwrap();
        }

        // channel still refuses — fails again rather than sticking in Pending
        dispatcher.tick(Utc::now()).await.unwrap();
        let guard = store.lock().await;
        assert_eq!(guard.get_message(&ids[0]).unwrap().status, MessageStatus::Failed);
    }
}
