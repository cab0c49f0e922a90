//! Contact store operations.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::params;

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::types::{normalize_phone, Contact, DeleteOutcome, NewContact};

use crate::db::{parse_rfc3339, store_err, to_rfc3339, CampaignStore};

/// Contacts deleted per progress report.
pub const DELETE_CHUNK_SIZE: usize = 25;

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        name: row.get(2)?,
        surname: row.get(3)?,
        email: row.get(4)?,
        birthday: row.get(5)?,
        source: row.get(6)?,
        notes: row.get(7)?,
        created_at: parse_rfc3339(&row.get::<_, String>(8)?),
    })
}

const CONTACT_COLUMNS: &str =
    "id, phone_number, name, surname, email, birthday, source, notes, created_at";

impl CampaignStore {
    /// All contacts, ordered by name.
    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY name, surname"
            ))
            .map_err(|e| store_err("List contacts", e))?;
        let rows = stmt
            .query_map([], row_to_contact)
            .map_err(|e| store_err("List contacts", e))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_contact(&self, id: &str) -> Result<Contact> {
        self.conn
            .query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                params![id],
                row_to_contact,
            )
            .map_err(|_| BlastClawError::NotFound(format!("contact {id}")))
    }

    /// Set of all persisted normalized phone numbers — the existing set
    /// the admission pipeline classifies against.
    pub fn contact_phone_set(&self) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT phone_number FROM contacts")
            .map_err(|e| store_err("Phone set", e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| store_err("Phone set", e))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Create a contact. The phone number is normalized here; an empty
    /// result is a validation error, an already-taken number a
    /// `DUPLICATE_PHONE` conflict.
    pub fn create_contact(&self, data: NewContact) -> Result<Contact> {
        let phone = normalize_phone(&data.phone_number);
        if phone.is_empty() {
            return Err(BlastClawError::Validation("phone number is required".into()));
        }
        if self.phone_taken(&phone, None)? {
            return Err(BlastClawError::Conflict(format!("DUPLICATE_PHONE: {phone}")));
        }

        let contact = Contact {
            id: uuid::Uuid::new_v4().to_string(),
            phone_number: phone,
            name: data.name,
            surname: data.surname,
            email: data.email,
            birthday: data.birthday,
            source: data.source,
            notes: data.notes,
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO contacts (id, phone_number, name, surname, email, birthday, source, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    contact.id,
                    contact.phone_number,
                    contact.name,
                    contact.surname,
                    contact.email,
                    contact.birthday,
                    contact.source,
                    contact.notes,
                    to_rfc3339(contact.created_at),
                ],
            )
            .map_err(|e| match e {
                // UNIQUE backstop, should not trigger under the single owner
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    BlastClawError::Conflict(format!("DUPLICATE_PHONE: {}", contact.phone_number))
                }
                e => store_err("Create contact", e),
            })?;
        Ok(contact)
    }

    /// Update a contact. The phone number is re-validated for uniqueness
    /// against every other contact.
    pub fn update_contact(&self, id: &str, data: NewContact) -> Result<Contact> {
        let mut contact = self.get_contact(id)?;
        let phone = normalize_phone(&data.phone_number);
        if phone.is_empty() {
            return Err(BlastClawError::Validation("phone number is required".into()));
        }
        if phone != contact.phone_number && self.phone_taken(&phone, Some(id))? {
            return Err(BlastClawError::Conflict(format!("DUPLICATE_PHONE: {phone}")));
        }

        contact.phone_number = phone;
        contact.name = data.name;
        contact.surname = data.surname;
        contact.email = data.email;
        contact.birthday = data.birthday;
        contact.notes = data.notes;

        self.conn
            .execute(
                "UPDATE contacts SET phone_number = ?2, name = ?3, surname = ?4, email = ?5,
                 birthday = ?6, notes = ?7 WHERE id = ?1",
                params![
                    contact.id,
                    contact.phone_number,
                    contact.name,
                    contact.surname,
                    contact.email,
                    contact.birthday,
                    contact.notes,
                ],
            )
            .map_err(|e| store_err("Update contact", e))?;
        Ok(contact)
    }

    /// Delete contacts in bulk. Unknown ids are counted as errors; the
    /// operation never aborts early. `progress` fires after every chunk
    /// of [`DELETE_CHUNK_SIZE`].
    pub fn delete_contacts_bulk(
        &self,
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
                    .execute("DELETE FROM contacts WHERE id = ?1", params![id])
                {
                    Ok(0) => outcome.errors += 1,
                    Ok(_) => outcome.deleted += 1,
                    Err(e) => {
                        tracing::warn!("Delete contact {id} failed: {e}");
                        outcome.errors += 1;
                    }
                }
            }
            progress(outcome);
        }
        outcome
    }

    fn phone_taken(&self, phone: &str, exclude_id: Option<&str>) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM contacts WHERE phone_number = ?1 AND id != ?2",
                params![phone, exclude_id.unwrap_or("")],
                |row| row.get(0),
            )
            .map_err(|e| store_err("Phone lookup", e))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_contact(phone: &str, name: &str) -> NewContact {
        NewContact {
            phone_number: phone.into(),
            name: name.into(),
            surname: String::new(),
            email: None,
            birthday: None,
            source: "manual".into(),
            notes: None,
        }
    }

    #[test]
    fn test_create_and_list() {
        let store = CampaignStore::open_in_memory().unwrap();
        let ada = store.create_contact(new_contact("+49 170 1", "Ada")).unwrap();
        assert_eq!(ada.phone_number, "+491701");

        store.create_contact(new_contact("5552", "Bob")).unwrap();
        let all = store.list_contacts().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Ada");
    }

    #[test]
    fn test_duplicate_phone_conflict() {
        let store = CampaignStore::open_in_memory().unwrap();
        store.create_contact(new_contact("5551", "Ada")).unwrap();
        // same number, different formatting
        let err = store
            .create_contact(new_contact("55-51", "Imposter"))
            .unwrap_err();
        assert!(err.is_duplicate_phone());
    }

    #[test]
    fn test_missing_phone_is_validation_error() {
        let store = CampaignStore::open_in_memory().unwrap();
        let err = store.create_contact(new_contact("  ", "Ghost")).unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_update_revalidates_uniqueness() {
        let store = CampaignStore::open_in_memory().unwrap();
        let ada = store.create_contact(new_contact("5551", "Ada")).unwrap();
        store.create_contact(new_contact("5552", "Bob")).unwrap();

        let err = store
            .update_contact(&ada.id, new_contact("5552", "Ada"))
            .unwrap_err();
        assert!(err.is_duplicate_phone());

        // keeping the own number is fine
        let updated = store
            .update_contact(&ada.id, new_contact("5551", "Ada L."))
            .unwrap();
        assert_eq!(updated.name, "Ada L.");
    }

    #[test]
    fn test_bulk_delete_counts_and_progress() {
        let store = CampaignStore::open_in_memory().unwrap();
        let mut ids: Vec<String> = (0..30)
            .map(|i| {
                store
                    .create_contact(new_contact(&format!("55{i:03}"), "C"))
                    .unwrap()
                    .id
            })
            .collect();
        ids.push("no-such-id".into());

        let mut reports = Vec::new();
        let outcome = store.delete_contacts_bulk(&ids, |o| reports.push(o));
        assert_eq!(outcome.total, 31);
        assert_eq!(outcome.deleted, 30);
        assert_eq!(outcome.errors, 1);
        // 31 ids in chunks of 25 → 2 progress callbacks
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1], outcome);
        assert!(store.list_contacts().unwrap().is_empty());
    }

    #[test]
    fn test_phone_set() {
        let store = CampaignStore::open_in_memory().unwrap();
        store.create_contact(new_contact("5551", "A")).unwrap();
        store.create_contact(new_contact("5552", "B")).unwrap();
        let set = store.contact_phone_set().unwrap();
        assert!(set.contains("5551") && set.contains("5552"));
        assert_eq!(set.len(), 2);
    }
}
