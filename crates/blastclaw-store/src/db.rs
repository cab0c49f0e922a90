//! SQLite connection, migrations, and shared row codecs.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::types::ScheduledMessage;

/// The campaign store: one SQLite connection plus the in-memory message
/// cache (`messages` keyed by id, `by_external` mapping channel ids back
/// to message ids).
pub struct CampaignStore {
    pub(crate) conn: Connection,
    pub(crate) messages: HashMap<String, ScheduledMessage>,
    pub(crate) by_external: HashMap<String, String>,
}

impl CampaignStore {
    /// Open (or create) the campaign database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BlastClawError::Store(format!("DB open: {e}")))?;
        let mut store = Self {
            conn,
            messages: HashMap::new(),
            by_external: HashMap::new(),
        };
        store.migrate()?;
        let count = store.reload_messages()?;
        if count > 0 {
            tracing::info!("Campaign store loaded: {count} message(s)");
        }
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BlastClawError::Store(format!("DB open: {e}")))?;
        let mut store = Self {
            conn,
            messages: HashMap::new(),
            by_external: HashMap::new(),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                phone_number TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                surname TEXT NOT NULL DEFAULT '',
                email TEXT,
                birthday TEXT,
                source TEXT NOT NULL DEFAULT 'manual',
                notes TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                image_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                contact_id TEXT NOT NULL,
                template_id TEXT NOT NULL,
                content_snapshot TEXT NOT NULL,
                image_path_snapshot TEXT,
                status TEXT NOT NULL,
                scheduled_time TEXT NOT NULL,
                sent_time TEXT,
                delivered_time TEXT,
                read_time TEXT,
                external_id TEXT UNIQUE,
                error_message TEXT,
                created_at TEXT NOT NULL
            );

            -- Single-row style key/value settings (sending window etc.)
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
         ",
            )
            .map_err(|e| BlastClawError::Store(format!("Migration: {e}")))?;
        Ok(())
    }
}

// ─── Row codecs ──────────────────────────────────────

pub(crate) fn to_rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub(crate) fn opt_rfc3339(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.to_rfc3339())
}

pub(crate) fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_opt_rfc3339(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

pub(crate) fn store_err(context: &str, e: rusqlite::Error) -> BlastClawError {
    BlastClawError::Store(format!("{context}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_migrate() {
        let dir = std::env::temp_dir().join("blastclaw-store-db-test");
        std::fs::create_dir_all(&dir).ok();
        let store = CampaignStore::open(&dir.join("test.db")).unwrap();
        assert!(store.messages.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let dir = std::env::temp_dir().join("blastclaw-store-db-test2");
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("test2.db");
        drop(CampaignStore::open(&path).unwrap());
        // Second open runs migrations again against existing tables.
        assert!(CampaignStore::open(&path).is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let now = Utc::now();
        let parsed = parse_rfc3339(&to_rfc3339(now));
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
