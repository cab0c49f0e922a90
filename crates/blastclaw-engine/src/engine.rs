//! The campaign engine — command/query surface over the stores.
//!
//! Owns the store behind one `tokio::sync::Mutex` (the single logical
//! owner of all campaign state), the channel handle, and the event bus.
//! Background work (dispatch loop, reconciler, channel status bridge) is
//! spawned from here.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, Mutex};

use blastclaw_core::error::Result;
use blastclaw_core::traits::{Channel, ContactWriter};
use blastclaw_core::types::{
    Contact, DeleteOutcome, ImportRecord, ImportReport, NewContact, NewTemplate, RawContact,
    ScheduleOutcome, ScheduledMessage, SendWindow, StatusEvent, Template,
};
use blastclaw_import::ImportBatch;
use blastclaw_scheduler::plan_batch;
use blastclaw_store::CampaignStore;

use crate::bus::{EngineEvent, EventBus};
use crate::dispatcher::{Dispatcher, DISPATCH_CHECK_SECS};
use crate::reconciler::Reconciler;

/// The one owner of campaign state. Every mutation goes through this
/// mutex — scheduling requests, reconciliation events, and bulk
/// operations serialize against it.
pub type SharedStore = Arc<Mutex<CampaignStore>>;

pub struct CampaignEngine {
    store: SharedStore,
    channel: Arc<dyn Channel>,
    bus: EventBus,
    default_window: SendWindow,
    events_tx: mpsc::UnboundedSender<StatusEvent>,
    events_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<StatusEvent>>>,
}

impl CampaignEngine {
    pub fn new(store: CampaignStore, channel: Arc<dyn Channel>, default_window: SendWindow) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store: Arc::new(Mutex::new(store)),
            channel,
            bus: EventBus::new(),
            default_window,
            events_tx,
            events_rx: std::sync::Mutex::new(Some(events_rx)),
        }
    }

    /// Spawn the dispatch loop, the reconciler, and the bridge that
    /// feeds the channel's push stream into the reconciler queue.
    pub fn spawn_background(&self) {
        let dispatcher = Dispatcher::new(
            self.store.clone(),
            self.channel.clone(),
            self.bus.clone(),
            self.default_window.clone(),
        );
        tokio::spawn(dispatcher.run(DISPATCH_CHECK_SECS));

        if let Some(rx) = self.events_rx.lock().unwrap().take() {
            let reconciler = Reconciler::new(self.store.clone(), self.bus.clone());
            tokio::spawn(reconciler.run(rx));
        }

        let channel = self.channel.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            match channel.listen().await {
                Ok(mut stream) => {
                    while let Some(event) = stream.next().await {
                        let _ = events_tx.send(event);
                    }
                }
                Err(e) => tracing::warn!("Channel listen unavailable: {e}"),
            }
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    /// Feed inbound status events (e.g. parsed from the webhook) into
    /// the reconciler queue.
    pub fn push_status_events(&self, events: Vec<StatusEvent>) {
        for event in events {
            let _ = self.events_tx.send(event);
        }
    }

    // ─── Contacts ──────────────────────────────────────

    pub async fn contacts(&self) -> Result<Vec<Contact>> {
        self.store.lock().await.list_contacts()
    }

    pub async fn create_contact(&self, data: NewContact) -> Result<Contact> {
        self.store.lock().await.create_contact(data)
    }

    pub async fn update_contact(&self, id: &str, data: NewContact) -> Result<Contact> {
        self.store.lock().await.update_contact(id, data)
    }

    /// Bulk delete with `delete-progress` events per chunk.
    pub async fn delete_contacts(&self, ids: &[String]) -> DeleteOutcome {
        let store = self.store.lock().await;
        let bus = self.bus.clone();
        store.delete_contacts_bulk(ids, |outcome| {
            bus.emit(EngineEvent::DeleteProgress { outcome });
        })
    }

    // ─── Templates ──────────────────────────────────────

    pub async fn templates(&self) -> Result<Vec<Template>> {
        self.store.lock().await.list_templates()
    }

    pub async fn template(&self, id: &str) -> Result<Template> {
        self.store.lock().await.get_template(id)
    }

    pub async fn create_template(&self, data: NewTemplate) -> Result<Template> {
        self.store.lock().await.create_template(data)
    }

    pub async fn update_template(&self, id: &str, data: NewTemplate) -> Result<Template> {
        self.store.lock().await.update_template(id, data)
    }

    pub async fn delete_template(&self, id: &str) -> Result<()> {
        self.store.lock().await.delete_template(id)
    }

    // ─── Settings ──────────────────────────────────────

    pub async fn send_window(&self) -> Result<SendWindow> {
        self.store.lock().await.send_window(&self.default_window)
    }

    pub async fn update_send_window(&self, window: &SendWindow) -> Result<()> {
        self.store.lock().await.set_send_window(window)
    }

    // ─── Import ──────────────────────────────────────

    pub fn parse_contacts_file(&self, path: &Path, ext: &str) -> Result<Vec<RawContact>> {
        blastclaw_import::parse_contacts_file(path, ext)
    }

    /// Classify a raw batch against the persisted phone set.
    pub async fn classify_import(&self, raw: Vec<RawContact>) -> Result<ImportBatch> {
        let existing = self.store.lock().await.contact_phone_set()?;
        Ok(ImportBatch::classify(raw, &existing))
    }

    /// Commit a resolved batch, emitting `import-progress` per chunk.
    pub async fn commit_import(&self, records: Vec<ImportRecord>) -> Result<ImportReport> {
        let batch = ImportBatch::from_records(records);
        let writer = StoreContactWriter {
            store: self.store.clone(),
        };
        let bus = self.bus.clone();
        batch
            .commit(&writer, |outcome| {
                bus.emit(EngineEvent::ImportProgress { outcome });
            })
            .await
    }

    // ─── Scheduling surface ──────────────────────────────────────

    /// Plan dispatch slots for the given contacts under the current
    /// window and create `Scheduled` messages. A window config error is
    /// fatal and surfaces to the caller; a missing contact only skips
    /// that item.
    pub async fn schedule_messages(
        &self,
        contact_ids: &[String],
        template_id: &str,
        base_time: Option<DateTime<Utc>>,
    ) -> Result<ScheduleOutcome> {
        let base = base_time.unwrap_or_else(Utc::now);
        let mut store = self.store.lock().await;
        let window = store.send_window(&self.default_window)?;
        let template = store.get_template(template_id)?;
        let slots = plan_batch(&window, contact_ids.len(), base)?;

        let mut scheduled_count = 0;
        for (contact_id, slot) in contact_ids.iter().zip(slots) {
            match store.get_contact(contact_id) {
                Ok(contact) => {
                    store.schedule_message(&contact, &template, slot)?;
                    scheduled_count += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping schedule for {contact_id}: {e}");
                }
            }
        }
        tracing::info!(
            "Scheduled {scheduled_count}/{} message(s) with template '{}'",
            contact_ids.len(),
            template.name
        );
        Ok(ScheduleOutcome {
            success: true,
            scheduled_count,
        })
    }

    pub async fn scheduled_messages(&self) -> Vec<ScheduledMessage> {
        self.store.lock().await.list_messages()
    }

    pub async fn cancel_scheduled_message(&self, id: &str) -> Result<ScheduledMessage> {
        self.store.lock().await.cancel_message(id)
    }

    pub async fn retry_failed_message(&self, id: &str) -> Result<ScheduledMessage> {
        self.store.lock().await.retry_message(id)
    }

    /// Bulk delete messages with `delete-progress` events per chunk.
    pub async fn delete_messages(&self, ids: &[String]) -> DeleteOutcome {
        let mut store = self.store.lock().await;
        let bus = self.bus.clone();
        store.delete_messages_bulk(ids, |outcome| {
            bus.emit(EngineEvent::DeleteProgress { outcome });
        })
    }
}

/// `ContactWriter` over the shared store — the commit path of the
/// admission pipeline.
struct StoreContactWriter {
    store: SharedStore,
}

#[async_trait]
impl ContactWriter for StoreContactWriter {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact> {
        self.store.lock().await.create_contact(contact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blastclaw_channels::MockChannel;
    use blastclaw_core::types::MessageStatus;
    use chrono::TimeZone;

    fn engine_with(window: SendWindow) -> CampaignEngine {
        let store = CampaignStore::open_in_memory().unwrap();
        CampaignEngine::new(store, Arc::new(MockChannel::new()), window)
    }

    fn open_window() -> SendWindow {
        SendWindow {
            active_days: vec![1, 2, 3, 4, 5, 6, 7],
            start_minute: 0,
            end_minute: 1440,
            message_interval_secs: 45,
            is_active: true,
        }
    }

    async fn seed_contacts(engine: &CampaignEngine, n: usize) -> Vec<String> {
        let mut ids = Vec::new();
        for i in 0..n {
            let contact = engine
                .create_contact(NewContact {
                    phone_number: format!("55{i:04}"),
                    name: format!("C{i}"),
                    surname: String::new(),
                    email: None,
                    birthday: None,
                    source: "manual".into(),
                    notes: None,
                })
                .await
                .unwrap();
            ids.push(contact.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_schedule_messages_plans_spaced_slots() {
        let engine = engine_with(open_window());
        let contact_ids = seed_contacts(&engine, 3).await;
        let template = engine
            .create_template(NewTemplate {
                name: "t".into(),
                content: "Hi {name}!".into(),
                image_path: None,
            })
            .await
            .unwrap();

        let base = Utc.with_ymd_and_hms(2026, 2, 25, 10, 0, 0).unwrap();
        let outcome = engine
            .schedule_messages(&contact_ids, &template.id, Some(base))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.scheduled_count, 3);

        let messages = engine.scheduled_messages().await;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].scheduled_time, base);
        assert_eq!(
            messages[1].scheduled_time - messages[0].scheduled_time,
            chrono::Duration::seconds(45)
        );
        assert!(messages.iter().all(|m| m.status == MessageStatus::Scheduled));
        assert!(messages.iter().any(|m| m.content_snapshot == "Hi C0!"));
    }

    #[tokio::test]
    async fn test_schedule_messages_config_error_is_fatal() {
        let engine = engine_with(SendWindow {
            active_days: vec![],
            ..open_window()
        });
        let contact_ids = seed_contacts(&engine, 1).await;
        let template = engine
            .create_template(NewTemplate {
                name: "t".into(),
                content: "x".into(),
                image_path: None,
            })
            .await
            .unwrap();

        let err = engine
            .schedule_messages(&contact_ids, &template.id, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG");
        assert!(engine.scheduled_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_schedule_skips_missing_contacts() {
        let engine = engine_with(open_window());
        let mut contact_ids = seed_contacts(&engine, 2).await;
        contact_ids.insert(1, "ghost".into());
        let template = engine
            .create_template(NewTemplate {
                name: "t".into(),
                content: "x".into(),
                image_path: None,
            })
            .await
            .unwrap();

        let outcome = engine
            .schedule_messages(&contact_ids, &template.id, None)
            .await
            .unwrap();
        assert_eq!(outcome.scheduled_count, 2);
    }

    #[tokio::test]
    async fn test_bulk_delete_outcome_counts() {
        let engine = engine_with(open_window());
        let contact_ids = seed_contacts(&engine, 1).await;
        let template = engine
            .create_template(NewTemplate {
                name: "t".into(),
                content: "x".into(),
                image_path: None,
            })
            .await
            .unwrap();

        // 97 real messages...
        let mut ids = Vec::new();
        for _ in 0..97 {
            engine
                .schedule_messages(&contact_ids, &template.id, None)
                .await
                .unwrap();
        }
        for message in engine.scheduled_messages().await {
            ids.push(message.id);
        }
        // ...plus 3 ids the backing store cannot delete
        ids.extend((0..3).map(|i| format!("ghost-{i}")));

        let mut rx = engine.subscribe();
        let outcome = engine.delete_messages(&ids).await;
        assert_eq!(outcome.deleted, 97);
        assert_eq!(outcome.errors, 3);
        assert_eq!(outcome.total, 100);
        assert!(engine.scheduled_messages().await.is_empty());

        // 100 ids in chunks of 25 → 4 progress events
        let mut progress = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::DeleteProgress { .. }) {
                progress += 1;
            }
        }
        assert_eq!(progress, 4);
    }

    #[tokio::test]
    async fn test_import_flow_classify_then_commit() {
        let engine = engine_with(open_window());
        // one contact already persisted
        engine
            .create_contact(NewContact {
                phone_number: "111".into(),
                name: "Existing".into(),
                surname: String::new(),
                email: None,
                birthday: None,
                source: "manual".into(),
                notes: None,
            })
            .await
            .unwrap();

        let raw = vec![
            RawContact { phone_number: "111".into(), name: "Dup".into(), ..Default::default() },
            RawContact { phone_number: "222".into(), name: "New".into(), ..Default::default() },
            RawContact { phone_number: "".into(), name: "NoPhone".into(), ..Default::default() },
        ];
        let batch = engine.classify_import(raw).await.unwrap();
        let counts = batch.counts();
        assert_eq!(counts.valid, 1);
        assert_eq!(counts.duplicate_existing, 1);
        assert_eq!(counts.missing, 1);

        let mut rx = engine.subscribe();
        let report = engine
            .commit_import(batch.records().to_vec())
            .await
            .unwrap();
        assert_eq!(report.outcome.imported, 1);
        assert_eq!(report.outcome.total, 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::ImportProgress { .. }
        ));

        let contacts = engine.contacts().await.unwrap();
        assert_eq!(contacts.len(), 2);
    }
}
