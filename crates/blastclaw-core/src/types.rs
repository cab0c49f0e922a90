//! Domain data model shared by every BlastClaw crate.
//!
//! Wire-facing structs use camelCase field names so gateway payloads match
//! what campaign clients already speak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Smallest legal spacing between two sends, in seconds.
pub const MIN_MESSAGE_INTERVAL_SECS: u32 = 5;

/// Normalize a raw phone number to canonical form: an optional leading `+`
/// followed by digits only. Spaces, dashes, dots, and parentheses are
/// stripped; anything else non-numeric is dropped. Returns an empty string
/// when nothing usable remains.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, ch) in trimmed.chars().enumerate() {
        if ch == '+' && i == 0 {
            out.push('+');
        } else if ch.is_ascii_digit() {
            out.push(ch);
        }
    }
    if out == "+" { String::new() } else { out }
}

// ─── Contacts ──────────────────────────────────────

/// A persisted contact. `phone_number` is stored normalized and is the
/// unique key — it never changes to collide with another contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub phone_number: String,
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    /// Where the contact came from: "import" or "manual".
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn default_source() -> String { "manual".into() }

/// Payload for creating or updating a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub phone_number: String,
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub notes: Option<String>,
}

// ─── Templates ──────────────────────────────────────

/// A message template. `content` may contain `{placeholder}` tokens
/// (`{name}`, `{surname}`, `{phone}`, `{email}`) substituted per contact
/// when a message is scheduled. Editing a template never touches messages
/// that were already scheduled from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating or updating a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTemplate {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub image_path: Option<String>,
}

// ─── Sending window ──────────────────────────────────────

/// The sending-window policy: which weekdays sends are allowed on
/// (ISO numbering, Monday = 1), the daily time range in minutes of day,
/// and the minimum spacing between consecutive sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendWindow {
    pub active_days: Vec<u8>,
    pub start_minute: u16,
    pub end_minute: u16,
    pub message_interval_secs: u32,
    pub is_active: bool,
}

impl Default for SendWindow {
    fn default() -> Self {
        Self {
            active_days: vec![1, 2, 3, 4, 5],
            start_minute: 9 * 60,
            end_minute: 17 * 60,
            message_interval_secs: 45,
            is_active: true,
        }
    }
}

impl SendWindow {
    /// Validate the window shape. An empty day set or an inverted time
    /// range is a config error, never silently defaulted.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::BlastClawError;
        if self.active_days.is_empty() {
            return Err(BlastClawError::Config(
                "sending window has no active days".into(),
            ));
        }
        if let Some(bad) = self.active_days.iter().find(|d| **d < 1 || **d > 7) {
            return Err(BlastClawError::Config(format!(
                "active day out of range 1-7: {bad}"
            )));
        }
        if self.start_minute >= self.end_minute {
            return Err(BlastClawError::Config(format!(
                "window start {} must be before end {}",
                self.start_minute, self.end_minute
            )));
        }
        if self.end_minute > 24 * 60 {
            return Err(BlastClawError::Config(format!(
                "window end {} past end of day",
                self.end_minute
            )));
        }
        if self.message_interval_secs < MIN_MESSAGE_INTERVAL_SECS {
            return Err(BlastClawError::Config(format!(
                "message interval {}s below minimum {}s",
                self.message_interval_secs, MIN_MESSAGE_INTERVAL_SECS
            )));
        }
        Ok(())
    }
}

// ─── Messages ──────────────────────────────────────

/// Delivery lifecycle states. The success chain is
/// Scheduled → Pending → Sent → Delivered → Read (events may skip steps
/// forward); Failed and Canceled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    Scheduled,
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
    Canceled,
}

impl MessageStatus {
    /// Ordinal position in the success chain. Terminal states have no
    /// rank — regressions are decided by `is_terminal`, not ordering.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Self::Scheduled => Some(0),
            Self::Pending => Some(1),
            Self::Sent => Some(2),
            Self::Delivered => Some(3),
            Self::Read => Some(4),
            Self::Failed | Self::Canceled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    /// Parse a status code, accepting both our uppercase codes and the
    /// lowercase strings WhatsApp-style webhooks deliver.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SCHEDULED" => Some(Self::Scheduled),
            "PENDING" => Some(Self::Pending),
            "SENT" => Some(Self::Sent),
            "DELIVERED" => Some(Self::Delivered),
            "READ" => Some(Self::Read),
            "FAILED" => Some(Self::Failed),
            "CANCELED" | "CANCELLED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// A message queued for (or already handed to) the external channel.
/// `content_snapshot` and `image_path_snapshot` are captured when the
/// message is created and never re-derived from the template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: String,
    pub contact_id: String,
    pub template_id: String,
    pub content_snapshot: String,
    #[serde(default)]
    pub image_path_snapshot: Option<String>,
    pub status: MessageStatus,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default)]
    pub sent_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_time: Option<DateTime<Utc>>,
    /// Assigned by the external channel once dispatched; immutable after.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A delivery-status event pushed by the external channel. Arrival order
/// and uniqueness are not guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub external_id: String,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sent_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

// ─── Import ──────────────────────────────────────

/// A raw record out of a parsed contact file, before classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContact {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Admission classification of one import record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    Valid,
    DuplicateInFile,
    DuplicateExisting,
    Missing,
    /// Effective (display) state of a deselected record — not an
    /// admission result.
    Skipped,
}

/// One record inside an import batch. `classification` is the admission
/// result and does not change afterwards; `selected` is what the user
/// toggles, and `effective_classification` folds the two together for
/// display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    #[serde(flatten)]
    pub raw: RawContact,
    pub normalized_phone: String,
    pub classification: Classification,
    pub selected: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

impl ImportRecord {
    /// True when the record belongs to the commit set: admitted as Valid
    /// or DuplicateInFile, and still selected.
    pub fn committable(&self) -> bool {
        self.selected
            && matches!(
                self.classification,
                Classification::Valid | Classification::DuplicateInFile
            )
    }

    /// Classification as shown to the user: deselected records read as
    /// Skipped regardless of how they were admitted.
    pub fn effective_classification(&self) -> Classification {
        if !self.selected
            && matches!(
                self.classification,
                Classification::Valid | Classification::DuplicateInFile
            )
        {
            Classification::Skipped
        } else {
            self.classification
        }
    }
}

// ─── Bulk-operation outcomes ──────────────────────────────────────

/// Summary of an import commit (also emitted as chunk progress).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub total: usize,
}

/// Summary of a bulk delete (also emitted as chunk progress).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub errors: usize,
    pub total: usize,
}

/// Result of a scheduling request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOutcome {
    pub success: bool,
    pub scheduled_count: usize,
}

/// One per-record failure collected during an import commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub phone_number: String,
    pub reason: String,
}

/// Full import commit report: summary counts plus individual failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    #[serde(flatten)]
    pub outcome: ImportOutcome,
    pub failures: Vec<ImportFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(" +49 (170) 555-01.23 "), "+491705550123");
        assert_eq!(normalize_phone("0170/5550123"), "01705550123");
        assert_eq!(normalize_phone("call me"), "");
        assert_eq!(normalize_phone("+"), "");
        // `+` only counts at the front
        assert_eq!(normalize_phone("49+170"), "49170");
    }

    #[test]
    fn test_status_rank_ordering() {
        assert!(MessageStatus::Sent.rank() < MessageStatus::Delivered.rank());
        assert!(MessageStatus::Delivered.rank() < MessageStatus::Read.rank());
        assert_eq!(MessageStatus::Failed.rank(), None);
        assert!(MessageStatus::Canceled.is_terminal());
        assert!(!MessageStatus::Read.is_terminal());
    }

    #[test]
    fn test_status_parse_webhook_strings() {
        assert_eq!(MessageStatus::parse("delivered"), Some(MessageStatus::Delivered));
        assert_eq!(MessageStatus::parse("SENT"), Some(MessageStatus::Sent));
        assert_eq!(MessageStatus::parse("cancelled"), Some(MessageStatus::Canceled));
        assert_eq!(MessageStatus::parse("queued"), None);
    }

    #[test]
    fn test_window_validation() {
        assert!(SendWindow::default().validate().is_ok());

        let empty_days = SendWindow { active_days: vec![], ..Default::default() };
        assert!(empty_days.validate().is_err());

        let inverted = SendWindow { start_minute: 600, end_minute: 540, ..Default::default() };
        assert!(inverted.validate().is_err());

        let tiny_interval = SendWindow { message_interval_secs: 1, ..Default::default() };
        assert!(tiny_interval.validate().is_err());

        let bad_day = SendWindow { active_days: vec![1, 8], ..Default::default() };
        assert!(bad_day.validate().is_err());
    }

    #[test]
    fn test_effective_classification() {
        let mut rec = ImportRecord {
            raw: RawContact { phone_number: "5551".into(), ..Default::default() },
            normalized_phone: "5551".into(),
            classification: Classification::Valid,
            selected: true,
            skip_reason: None,
        };
        assert_eq!(rec.effective_classification(), Classification::Valid);
        assert!(rec.committable());

        rec.selected = false;
        assert_eq!(rec.effective_classification(), Classification::Skipped);
        assert!(!rec.committable());

        rec.classification = Classification::Missing;
        assert_eq!(rec.effective_classification(), Classification::Missing);
    }
}
