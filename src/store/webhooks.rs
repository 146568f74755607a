use rusqlite::{params, OptionalExtension, Row};

use super::models::{ResourceType, Webhook};
use super::{new_id, StoreError, UnitOfWork};

const WEBHOOK_COLUMNS: &str = "id, external_id, path, resource_type, secret, project_id";

fn webhook_from_row(row: &Row<'_>) -> rusqlite::Result<Webhook> {
    let resource_type: String = row.get(3)?;
    let resource_type = resource_type.parse::<ResourceType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Webhook {
        id: row.get(0)?,
        external_id: row.get(1)?,
        path: row.get(2)?,
        resource_type,
        secret: row.get(4)?,
        project_id: row.get(5)?,
    })
}

impl UnitOfWork<'_> {
    pub fn insert_webhook(
        &self,
        path: &str,
        resource_type: ResourceType,
        project_id: Option<&str>,
    ) -> Result<Webhook, StoreError> {
        let path = path.trim();
        if !path.starts_with('/') {
            return Err(StoreError::InvalidInput(format!(
                "webhook path must be absolute: {path:?}"
            )));
        }
        let webhook = Webhook {
            id: new_id(),
            external_id: None,
            path: path.to_string(),
            resource_type,
            secret: None,
            project_id: project_id.map(str::to_string),
        };
        self.tx.execute(
            "INSERT INTO asana_webhook (id, path, resource_type, project_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                webhook.id,
                webhook.path,
                webhook.resource_type.as_str(),
                webhook.project_id
            ],
        )?;
        Ok(webhook)
    }

    pub fn webhook_by_path(&self, path: &str) -> Result<Option<Webhook>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("SELECT {WEBHOOK_COLUMNS} FROM asana_webhook WHERE path = ?1"),
                params![path],
                webhook_from_row,
            )
            .optional()?)
    }

    pub fn webhook_by_external_id(&self, external_id: &str) -> Result<Option<Webhook>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("SELECT {WEBHOOK_COLUMNS} FROM asana_webhook WHERE external_id = ?1"),
                params![external_id],
                webhook_from_row,
            )
            .optional()?)
    }

    pub fn list_webhooks(&self) -> Result<Vec<Webhook>, StoreError> {
        let mut stmt = self
            .tx
            .prepare(&format!("SELECT {WEBHOOK_COLUMNS} FROM asana_webhook ORDER BY path"))?;
        let rows = stmt.query_map([], webhook_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Store the handshake secret. Succeeds only while no secret is on file.
    pub fn confirm_webhook(&self, webhook_id: &str, secret: &str) -> Result<(), StoreError> {
        if secret.is_empty() {
            return Err(StoreError::InvalidInput("secret must not be empty".into()));
        }
        let updated = self.tx.execute(
            "UPDATE asana_webhook SET secret = ?2 WHERE id = ?1 AND (secret IS NULL OR secret = '')",
            params![webhook_id, secret],
        )?;
        if updated == 1 {
            return Ok(());
        }
        let exists: Option<String> = self
            .tx
            .query_row(
                "SELECT id FROM asana_webhook WHERE id = ?1",
                params![webhook_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Err(StoreError::SecretAlreadySet),
            None => Err(StoreError::unknown("webhook", webhook_id)),
        }
    }

    pub fn set_webhook_external_id(
        &self,
        webhook_id: &str,
        external_id: &str,
    ) -> Result<(), StoreError> {
        let updated = self.tx.execute(
            "UPDATE asana_webhook SET external_id = ?2 WHERE id = ?1",
            params![webhook_id, external_id],
        )?;
        if updated == 0 {
            return Err(StoreError::unknown("webhook", webhook_id));
        }
        Ok(())
    }

    /// Drop the local registration of a remote webhook, with its events
    pub fn delete_webhook_by_external_id(&self, external_id: &str) -> Result<bool, StoreError> {
        self.tx.execute(
            "DELETE FROM asana_event WHERE webhook_id IN (SELECT id FROM asana_webhook WHERE external_id = ?1)",
            params![external_id],
        )?;
        let deleted = self.tx.execute(
            "DELETE FROM asana_webhook WHERE external_id = ?1",
            params![external_id],
        )?;
        Ok(deleted > 0)
    }
}
