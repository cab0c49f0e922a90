//! Template store operations.

use chrono::Utc;
use rusqlite::params;

use blastclaw_core::error::{BlastClawError, Result};
use blastclaw_core::types::{NewTemplate, Template};

use crate::db::{parse_rfc3339, store_err, to_rfc3339, CampaignStore};

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        content: row.get(2)?,
        image_path: row.get(3)?,
        created_at: parse_rfc3339(&row.get::<_, String>(4)?),
        updated_at: parse_rfc3339(&row.get::<_, String>(5)?),
    })
}

const TEMPLATE_COLUMNS: &str = "id, name, content, image_path, created_at, updated_at";

impl CampaignStore {
    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY name"
            ))
            .map_err(|e| store_err("List templates", e))?;
        let rows = stmt
            .query_map([], row_to_template)
            .map_err(|e| store_err("List templates", e))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get_template(&self, id: &str) -> Result<Template> {
        self.conn
            .query_row(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"),
                params![id],
                row_to_template,
            )
            .map_err(|_| BlastClawError::NotFound(format!("template {id}")))
    }

    /// Create a template. Names are unique.
    pub fn create_template(&self, data: NewTemplate) -> Result<Template> {
        if data.name.trim().is_empty() {
            return Err(BlastClawError::Validation("template name is required".into()));
        }
        if self.template_name_taken(&data.name, None)? {
            return Err(BlastClawError::Conflict(format!(
                "template name taken: {}",
                data.name
            )));
        }
        let now = Utc::now();
        let template = Template {
            id: uuid::Uuid::new_v4().to_string(),
            name: data.name,
            content: data.content,
            image_path: data.image_path,
            created_at: now,
            updated_at: now,
        };
        self.conn
            .execute(
                "INSERT INTO templates (id, name, content, image_path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    template.id,
                    template.name,
                    template.content,
                    template.image_path,
                    to_rfc3339(template.created_at),
                    to_rfc3339(template.updated_at),
                ],
            )
            .map_err(|e| store_err("Create template", e))?;
        Ok(template)
    }

    /// Update a template. Already-scheduled messages keep their snapshots
    /// — nothing here touches the messages table.
    pub fn update_template(&self, id: &str, data: NewTemplate) -> Result<Template> {
        let mut template = self.get_template(id)?;
        if data.name != template.name && self.template_name_taken(&data.name, Some(id))? {
            return Err(BlastClawError::Conflict(format!(
                "template name taken: {}",
                data.name
            )));
        }
        template.name = data.name;
        template.content = data.content;
        template.image_path = data.image_path;
        template.updated_at = Utc::now();

        self.conn
            .execute(
                "UPDATE templates SET name = ?2, content = ?3, image_path = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    template.id,
                    template.name,
                    template.content,
                    template.image_path,
                    to_rfc3339(template.updated_at),
                ],
            )
            .map_err(|e| store_err("Update template", e))?;
        Ok(template)
    }

    pub fn delete_template(&self, id: &str) -> Result<()> {
        let affected = self
            .conn
            .execute("DELETE FROM templates WHERE id = ?1", params![id])
            .map_err(|e| store_err("Delete template", e))?;
        if affected == 0 {
            return Err(BlastClawError::NotFound(format!("template {id}")));
        }
        Ok(())
    }

    fn template_name_taken(&self, name: &str, exclude_id: Option<&str>) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM templates WHERE name = ?1 AND id != ?2",
                params![name, exclude_id.unwrap_or("")],
                |row| row.get(0),
            )
            .map_err(|e| store_err("Template lookup", e))?;
        Ok(count > 0)
    }
}
