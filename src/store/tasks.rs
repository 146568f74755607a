use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::{Map, Value};

use super::models::{Task, TaskChange, TaskField};
use super::{new_id, now, StoreError, UnitOfWork};

const TASK_COLUMNS: &str = "id, external_id, name, description, completed, completed_at, \
    class_of_service, task_progress, item_category, related_service, section, created_at, updated_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        completed: row.get(4)?,
        completed_at: row.get(5)?,
        class_of_service: row.get(6)?,
        task_progress: row.get(7)?,
        item_category: row.get(8)?,
        related_service: row.get(9)?,
        section: row.get(10)?,
        created_at: Some(row.get(11)?),
        updated_at: Some(row.get(12)?),
    })
}

fn encode_changes(changes: &BTreeMap<TaskField, Value>) -> String {
    let map: Map<String, Value> = changes
        .iter()
        .map(|(field, value)| (field.as_str().to_string(), value.clone()))
        .collect();
    Value::Object(map).to_string()
}

fn decode_changes(raw: &str) -> Result<BTreeMap<TaskField, Value>, StoreError> {
    let map: Map<String, Value> = serde_json::from_str(raw)?;
    map.into_iter()
        .map(|(key, value)| -> Result<(TaskField, Value), StoreError> {
            let field: TaskField = serde_json::from_value(Value::String(key))?;
            Ok((field, value))
        })
        .collect()
}

impl UnitOfWork<'_> {
    pub fn task_by_external_id(&self, external_id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM asana_task WHERE external_id = ?1"),
                params![external_id],
                task_from_row,
            )
            .optional()?)
    }

    pub fn count_tasks(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .tx
            .query_row("SELECT COUNT(*) FROM asana_task", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert or update `task`, assigning an id and timestamps to new rows
    pub fn save_task(&self, task: &mut Task) -> Result<(), StoreError> {
        let timestamp = now();
        if task.is_new() {
            task.id = new_id();
            task.created_at = Some(timestamp);
        }
        task.updated_at = Some(timestamp);
        self.tx.execute(
            r#"
            INSERT INTO asana_task (id, external_id, name, description, completed, completed_at,
              class_of_service, task_progress, item_category, related_service, section, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
              name=excluded.name,
              description=excluded.description,
              completed=excluded.completed,
              completed_at=excluded.completed_at,
              class_of_service=excluded.class_of_service,
              task_progress=excluded.task_progress,
              item_category=excluded.item_category,
              related_service=excluded.related_service,
              section=excluded.section,
              updated_at=excluded.updated_at
            "#,
            params![
                task.id,
                task.external_id,
                task.name,
                task.description,
                task.completed,
                task.completed_at,
                task.class_of_service,
                task.task_progress,
                task.item_category,
                task.related_service,
                task.section,
                task.created_at.unwrap_or(timestamp),
                timestamp
            ],
        )?;
        Ok(())
    }

    pub fn insert_task_change(
        &self,
        task: &Task,
        changes: BTreeMap<TaskField, Value>,
    ) -> Result<TaskChange, StoreError> {
        if task.is_new() {
            return Err(StoreError::InvalidInput(
                "task must be saved before recording changes".into(),
            ));
        }
        let change = TaskChange {
            id: new_id(),
            task_id: task.id.clone(),
            changes,
            created_at: now(),
        };
        self.tx.execute(
            "INSERT INTO asana_task_change (id, task_id, changes, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                change.id,
                change.task_id,
                encode_changes(&change.changes),
                change.created_at
            ],
        )?;
        Ok(change)
    }

    pub fn task_changes(&self, task_id: &str) -> Result<Vec<TaskChange>, StoreError> {
        let mut stmt = self.tx.prepare(
            "SELECT id, task_id, changes, created_at FROM asana_task_change WHERE task_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, DateTime<Utc>>(3)?,
            ))
        })?;
        let mut changes = Vec::new();
        for row in rows {
            let (id, task_id, raw, created_at) = row?;
            changes.push(TaskChange {
                id,
                task_id,
                changes: decode_changes(&raw)?,
                created_at,
            });
        }
        Ok(changes)
    }
}
