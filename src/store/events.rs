use chrono::{DateTime, Utc};
use rusqlite::params;
use serde_json::Value;

use super::models::{Event, Webhook};
use super::{new_id, now, StoreError, UnitOfWork};

impl UnitOfWork<'_> {
    /// Append one event batch for `webhook`.
    ///
    /// An empty batch is the upstream keep-alive and yields no row.
    pub fn record_event(&self, webhook: &Webhook, events: &[Value]) -> Result<Option<Event>, StoreError> {
        if events.is_empty() {
            return Ok(None);
        }
        let content = Value::Array(events.to_vec());
        let timestamp = now();
        let event = Event {
            id: new_id(),
            webhook_id: webhook.id.clone(),
            content,
            created_at: timestamp,
            updated_at: timestamp,
        };
        self.tx.execute(
            "INSERT INTO asana_event (id, webhook_id, content, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.webhook_id,
                serde_json::to_string(&event.content)?,
                event.created_at,
                event.updated_at
            ],
        )?;
        Ok(Some(event))
    }

    pub fn count_events(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .tx
            .query_row("SELECT COUNT(*) FROM asana_event", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn events_for_webhook(&self, webhook_id: &str) -> Result<Vec<Event>, StoreError> {
        let mut stmt = self.tx.prepare(
            "SELECT id, webhook_id, content, created_at, updated_at FROM asana_event WHERE webhook_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![webhook_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, DateTime<Utc>>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (id, webhook_id, content, created_at, updated_at) = row?;
            events.push(Event {
                id,
                webhook_id,
                content: serde_json::from_str(&content)?,
                created_at,
                updated_at,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::store::{ResourceType, Store};

    #[test]
    fn test_record_event_keeps_raw_batch() {
        let store = Store::open_in_memory().unwrap();
        let webhook = store
            .unit_of_work(|uow| uow.insert_webhook("/asana/projects", ResourceType::Project, None))
            .unwrap();
        let batch = vec![json!({"action": "added"}), json!({"action": "changed"})];

        let event = store
            .unit_of_work(|uow| uow.record_event(&webhook, &batch))
            .unwrap()
            .unwrap();
        assert_eq!(event.content, json!([{"action": "added"}, {"action": "changed"}]));

        let stored = store
            .unit_of_work(|uow| uow.events_for_webhook(&webhook.id))
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, event.content);
    }

    #[test]
    fn test_empty_batch_is_not_recorded() {
        let store = Store::open_in_memory().unwrap();
        let webhook = store
            .unit_of_work(|uow| uow.insert_webhook("/asana/projects", ResourceType::Project, None))
            .unwrap();

        let event = store
            .unit_of_work(|uow| uow.record_event(&webhook, &[]))
            .unwrap();
        assert!(event.is_none());
        assert_eq!(store.unit_of_work(|uow| uow.count_events()).unwrap(), 0);
    }
}
