//! Settings store — the sending window lives here as a JSON value.

use rusqlite::params;

use blastclaw_core::error::Result;
use blastclaw_core::types::SendWindow;

use crate::db::{store_err, CampaignStore};

const WINDOW_KEY: &str = "send_window";

impl CampaignStore {
    /// The current sending window. Falls back to the given default when
    /// nothing was persisted yet (first launch).
    pub fn send_window(&self, default: &SendWindow) -> Result<SendWindow> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![WINDOW_KEY],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(store_err("Read settings", e)),
            })?;

        match value {
            Some(json) => Ok(serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Stored sending window unreadable ({e}), using default");
                default.clone()
            })),
            None => Ok(default.clone()),
        }
    }

    /// Persist a new sending window. The window is validated first — an
    /// invalid one never reaches the store.
    pub fn set_send_window(&self, window: &SendWindow) -> Result<()> {
        window.validate()?;
        let json = serde_json::to_string(window)
            .map_err(|e| blastclaw_core::error::BlastClawError::Store(format!("Encode settings: {e}")))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![WINDOW_KEY, json],
            )
            .map_err(|e| store_err("Write settings", e))?;
        Ok(())
    }
}
