//! The message store and its delivery lifecycle.
//!
//! Messages live in SQLite (authoritative) and in an in-memory cache the
//! reconciler resolves events against. Status application is monotonic
//! over the success-chain rank with a terminal override; every timestamp
//! field is written at most once (first write wins).

use chrono::{DateTime, Utc};
use rusqlite::params;

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::types::{
    Contact, DeleteOutcome, MessageStatus, ScheduledMessage, StatusEvent, Template,
};

use crate::db::{opt_rfc3339, parse_opt_rfc3339, parse_rfc3339, store_err, to_rfc3339, CampaignStore};

/// Messages deleted per progress report.
pub const DELETE_CHUNK_SIZE: usize = 25;

/// What happened to an inbound status event.
#[derive(Debug, Clone)]
pub enum StatusApplied {
    /// The transition was accepted; the updated message is returned.
    Applied(ScheduledMessage),
    /// Duplicate or out-of-order event — discarded by design.
    Stale,
    /// No message with that external id in the cache.
    Unknown,
}

/// Substitute `{placeholder}` tokens with the contact's fields. Unknown
/// tokens stay verbatim.
pub fn render_template(content: &str, contact: &Contact) -> String {
    content
        .replace("{name}", &contact.name)
        .replace("{surname}", &contact.surname)
        .replace("{phone}", &contact.phone_number)
        .replace("{email}", contact.email.as_deref().unwrap_or(""))
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledMessage> {
    let status_str: String = row.get(5)?;
    Ok(ScheduledMessage {
        id: row.get(0)?,
        contact_id: row.get(1)?,
        template_id: row.get(2)?,
        content_snapshot: row.get(3)?,
        image_path_snapshot: row.get(4)?,
        status: MessageStatus::parse(&status_str).unwrap_or(MessageStatus::Failed),
        scheduled_time: parse_rfc3339(&row.get::<_, String>(6)?),
        sent_time: parse_opt_rfc3339(row.get(7)?),
        delivered_time: parse_opt_rfc3339(row.get(8)?),
        read_time: parse_opt_rfc3339(row.get(9)?),
        external_id: row.get(10)?,
        error_message: row.get(11)?,
        created_at: parse_rfc3339(&row.get::<_, String>(12)?),
    })
}

const MESSAGE_COLUMNS: &str = "id, contact_id, template_id, content_snapshot, image_path_snapshot, \
     status, scheduled_time, sent_time, delivered_time, read_time, external_id, error_message, created_at";

impl CampaignStore {
    /// Create a message in `Scheduled`, capturing the template snapshot
    /// at call time.
    pub fn schedule_message(
        &mut self,
        contact: &Contact,
        template: &Template,
        time: DateTime<Utc>,
    ) -> Result<ScheduledMessage> {
        let message = ScheduledMessage {
            id: uuid::Uuid::new_v4().to_string(),
            contact_id: contact.id.clone(),
            template_id: template.id.clone(),
            content_snapshot: render_template(&template.content, contact),
            image_path_snapshot: template.image_path.clone(),
            status: MessageStatus::Scheduled,
            scheduled_time: time,
            sent_time: None,
            delivered_time: None,
            read_time: None,
            external_id: None,
            error_message: None,
            created_at: Utc::now(),
        };
        self.persist_message(&message)?;
        self.cache_message(message.clone());
        Ok(message)
    }

    /// All messages, ordered by scheduled time.
    pub fn list_messages(&self) -> Vec<ScheduledMessage> {
        let mut all: Vec<ScheduledMessage> = self.messages.values().cloned().collect();
        all.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        all
    }

    pub fn get_message(&self, id: &str) -> Result<ScheduledMessage> {
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| BlastClawError::NotFound(format!("message {id}")))
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Messages ready for dispatch: Scheduled past their slot, plus
    /// Pending ones (retries re-enter here).
    pub fn due_messages(&self, now: DateTime<Utc>) -> Vec<ScheduledMessage> {
        let mut due: Vec<ScheduledMessage> = self
            .messages
            .values()
            .filter(|m| {
                matches!(m.status, MessageStatus::Scheduled | MessageStatus::Pending)
                    && m.scheduled_time <= now
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time).then(a.id.cmp(&b.id)));
        due
    }

    /// Claim a message for dispatch.
    pub fn mark_pending(&mut self, id: &str) -> Result<ScheduledMessage> {
        let mut message = self.get_message(id)?;
        if message.status == MessageStatus::Scheduled {
            message.status = MessageStatus::Pending;
            self.persist_message(&message)?;
            self.cache_message(message.clone());
        }
        Ok(message)
    }

    /// Record a successful handoff to the channel. The external id is
    /// written once; a second call for an already-dispatched message is
    /// ignored.
    pub fn mark_dispatched(
        &mut self,
        id: &str,
        external_id: &str,
        at: DateTime<Utc>,
    ) -> Result<ScheduledMessage> {
        let mut message = self.get_message(id)?;
        if let Some(existing) = &message.external_id {
            tracing::debug!("Message {id} already dispatched as {existing}, ignoring");
            return Ok(message);
        }
        message.external_id = Some(external_id.to_string());
        message.status = MessageStatus::Sent;
        if message.sent_time.is_none() {
            message.sent_time = Some(at);
        }
        self.persist_message(&message)?;
        self.cache_message(message.clone());
        Ok(message)
    }

    /// Record a dispatch failure.
    pub fn mark_failed(&mut self, id: &str, error: &str) -> Result<ScheduledMessage> {
        let mut message = self.get_message(id)?;
        message.status = MessageStatus::Failed;
        message.error_message = Some(error.to_string());
        self.persist_message(&message)?;
        self.cache_message(message.clone());
        Ok(message)
    }

    /// Cancel a message. Only legal before the channel has it
    /// (Scheduled or Pending) — anything later is a conflict.
    pub fn cancel_message(&mut self, id: &str) -> Result<ScheduledMessage> {
        let mut message = self.get_message(id)?;
        if !matches!(
            message.status,
            MessageStatus::Scheduled | MessageStatus::Pending
        ) {
            return Err(BlastClawError::Conflict(format!(
                "cannot cancel message in {}",
                message.status.as_str()
            )));
        }
        message.status = MessageStatus::Canceled;
        self.persist_message(&message)?;
        self.cache_message(message.clone());
        Ok(message)
    }

    /// Re-queue a failed message: back to Pending, error cleared.
    pub fn retry_message(&mut self, id: &str) -> Result<ScheduledMessage> {
        let mut message = self.get_message(id)?;
        if message.status != MessageStatus::Failed {
            return Err(BlastClawError::Conflict(format!(
                "cannot retry message in {}",
                message.status.as_str()
            )));
        }
        message.status = MessageStatus::Pending;
        message.error_message = None;
        self.persist_message(&message)?;
        self.cache_message(message.clone());
        Ok(message)
    }

    /// Delete messages regardless of status, collecting per-item
    /// outcomes. `progress` fires after every chunk.
    pub fn delete_messages_bulk(
        &mut self,
        ids: &[String],
        mut progress: impl FnMut(DeleteOutcome),
    ) -> DeleteOutcome {
        let mut outcome = DeleteOutcome {
            total: ids.len(),
            ..Default::default()
        };
        for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
            for id in chunk {
                match self
                    .conn
                    .execute("DELETE FROM messages WHERE id = ?1", params![id])
                {
                    Ok(0) => outcome.errors += 1,
                    Ok(_) => {
                        outcome.deleted += 1;
                        if let Some(removed) = self.messages.remove(id) {
                            if let Some(ext) = removed.external_id {
                                self.by_external.remove(&ext);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Delete message {id} failed: {e}");
                        outcome.errors += 1;
                    }
                }
            }
            progress(outcome);
        }
        outcome
    }

    /// Apply an inbound status event against the cache.
    ///
    /// Accepted iff the message is non-terminal and the event either
    /// carries a terminal status or climbs the success chain. Everything
    /// else is `Stale` (idempotent no-op). An unknown external id is
    /// `Unknown` — the caller reloads from the backing store and retries.
    pub fn apply_status(&mut self, event: &StatusEvent) -> Result<StatusApplied> {
        let Some(id) = self.by_external.get(&event.external_id).cloned() else {
            return Ok(StatusApplied::Unknown);
        };
        let Some(mut message) = self.messages.get(&id).cloned() else {
            return Ok(StatusApplied::Unknown);
        };

        let current = message.status;
        let accepted = if current.is_terminal() {
            false
        } else if event.status.is_terminal() {
            true
        } else {
            matches!(
                (event.status.rank(), current.rank()),
                (Some(new), Some(cur)) if new > cur
            )
        };
        if !accepted {
            return Ok(StatusApplied::Stale);
        }

        message.status = event.status;

        // Explicit per-field timestamps from the event fill gaps only.
        message.sent_time = message.sent_time.or(event.sent_time);
        message.delivered_time = message.delivered_time.or(event.delivered_time);
        message.read_time = message.read_time.or(event.read_time);
        // The field matching the new status gets the event timestamp.
        match event.status {
            MessageStatus::Sent if message.sent_time.is_none() => {
                message.sent_time = Some(event.timestamp);
            }
            MessageStatus::Delivered if message.delivered_time.is_none() => {
                message.delivered_time = Some(event.timestamp);
            }
            MessageStatus::Read if message.read_time.is_none() => {
                message.read_time = Some(event.timestamp);
            }
            MessageStatus::Failed => {
                message.error_message = event
                    .error_message
                    .clone()
                    .or_else(|| Some("delivery failed".into()));
            }
            _ => {}
        }

        self.persist_message(&message)?;
        self.cache_message(message.clone());
        Ok(StatusApplied::Applied(message))
    }

    /// Rebuild the cache from SQLite. Returns the number of messages.
    pub fn reload_messages(&mut self) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages"))
            .map_err(|e| store_err("Load messages", e))?;
        let rows = stmt
            .query_map([], row_to_message)
            .map_err(|e| store_err("Load messages", e))?;
        let loaded: Vec<ScheduledMessage> = rows.filter_map(|r| r.ok()).collect();
        drop(stmt);

        self.messages.clear();
        self.by_external.clear();
        for message in loaded {
            self.cache_message(message);
        }
        Ok(self.messages.len())
    }

    fn cache_message(&mut self, message: ScheduledMessage) {
        if let Some(ext) = &message.external_id {
            self.by_external.insert(ext.clone(), message.id.clone());
        }
        self.messages.insert(message.id.clone(), message);
    }

    fn persist_message(&self, message: &ScheduledMessage) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO messages
                 (id, contact_id, template_id, content_snapshot, image_path_snapshot, status,
                  scheduled_time, sent_time, delivered_time, read_time, external_id, error_message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    message.id,
                    message.contact_id,
                    message.template_id,
                    message.content_snapshot,
                    message.image_path_snapshot,
                    message.status.as_str(),
                    to_rfc3339(message.scheduled_time),
                    opt_rfc3339(message.sent_time),
                    opt_rfc3339(message.delivered_time),
                    opt_rfc3339(message.read_time),
                    message.external_id,
                    message.error_message,
                    to_rfc3339(message.created_at),
                ],
            )
            .map_err(|e| store_err("Save message", e))?;
        Ok(())
    }
}
