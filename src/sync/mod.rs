//! Task synchronizer.
//!
//! Turns a batch of task webhook events into local `Task` rows:
//! 1. EXTRACT - distinct remote task ids referenced by the batch
//! 2. FETCH   - current state of each task from Asana (before any lock is taken)
//! 3. APPLY   - copy remote values onto the local row, diff against the
//!    pre-mutation snapshot, persist the task plus one `TaskChange`
//!
//! Step 3 runs inside the caller's unit of work so the event row and the task
//! rows commit together.

mod field_map;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

pub use field_map::{FieldMapping, FieldMappings};

use crate::errors::AppError;
use crate::integrations::{AsanaApi, AsanaTask, ClientError};
use crate::store::{Task, TaskChange, UnitOfWork};

/// Result of syncing one remote task
#[derive(Debug, Clone)]
pub struct SyncedTask {
    pub task: Task,
    pub change: TaskChange,
    pub created: bool,
}

pub struct TaskSynchronizer {
    asana: Arc<dyn AsanaApi>,
    mappings: Arc<FieldMappings>,
}

impl TaskSynchronizer {
    pub fn new(asana: Arc<dyn AsanaApi>, mappings: Arc<FieldMappings>) -> Self {
        Self { asana, mappings }
    }

    /// Distinct `resource.gid` values in first-seen order
    pub fn task_ids(events: &[Value]) -> Result<Vec<String>, AppError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for event in events {
            let gid = event
                .get("resource")
                .and_then(|resource| resource.get("gid"))
                .and_then(Value::as_str)
                .ok_or_else(|| AppError::InvalidRequest("Incorrect event format".to_string()))?;
            if seen.insert(gid.to_string()) {
                ids.push(gid.to_string());
            }
        }
        Ok(ids)
    }

    /// Fetch the remote state of every task id. Any failure aborts the batch.
    pub async fn fetch(&self, ids: &[String]) -> Result<Vec<AsanaTask>, ClientError> {
        let mut remote = Vec::with_capacity(ids.len());
        for id in ids {
            debug!(task = %id, "fetching remote task");
            remote.push(self.asana.task(id).await?);
        }
        Ok(remote)
    }

    /// Copy remote values onto `task`
    pub fn apply(&self, task: &mut Task, remote: &AsanaTask) -> Result<(), ClientError> {
        task.name = remote.name.clone();
        task.description = remote.description.clone();
        task.completed = remote.completed;
        if let Some(raw) = remote.completed_at.as_deref().filter(|s| !s.is_empty()) {
            task.completed_at = Some(parse_timestamp(raw)?);
        }
        if let Some(section) = remote
            .memberships
            .first()
            .and_then(|membership| membership.section.as_ref())
            .and_then(|section| section.name.clone())
        {
            task.section = Some(section);
        }
        for field in &remote.custom_fields {
            if let Some((column, value)) = self.mappings.resolve(field) {
                task.set_classification(column, Some(value));
            }
        }
        Ok(())
    }

    /// Upsert every fetched task and record its change row.
    ///
    /// A change row is written on every pass, even when nothing differs, so
    /// the history shows each sync.
    pub fn persist(
        &self,
        uow: &UnitOfWork<'_>,
        remote_tasks: &[AsanaTask],
    ) -> Result<Vec<SyncedTask>, AppError> {
        let mut synced = Vec::with_capacity(remote_tasks.len());
        for remote in remote_tasks {
            let existing = uow.task_by_external_id(&remote.gid)?;
            let created = existing.is_none();
            let mut task = existing.unwrap_or_else(|| Task::shell(remote.gid.clone()));

            let before = task.snapshot();
            self.apply(&mut task, remote)?;
            let changes = before.changes_to(&task.snapshot());

            uow.save_task(&mut task)?;
            let change = uow.insert_task_change(&task, changes)?;
            debug!(
                task = %task.external_id,
                created,
                changed = change.changes.len(),
                "task synchronized"
            );
            synced.push(SyncedTask {
                task,
                change,
                created,
            });
        }
        Ok(synced)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ClientError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ClientError::Decode(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::integrations::{Compact, NewTask, TaskSearch, WebhookSpec};
    use crate::store::{Store, StoreError, TaskField};

    struct StaticAsana(HashMap<String, Value>);

    #[async_trait]
    impl AsanaApi for StaticAsana {
        async fn task(&self, gid: &str) -> Result<AsanaTask, ClientError> {
            let value = self.0.get(gid).cloned().ok_or(ClientError::Status {
                service: "asana",
                status: 404,
                body: String::new(),
            })?;
            Ok(serde_json::from_value(value).unwrap())
        }
        async fn section_tasks(&self, _: &str) -> Result<Vec<Compact>, ClientError> {
            Ok(vec![])
        }
        async fn subtasks(&self, _: &str) -> Result<Vec<Compact>, ClientError> {
            Ok(vec![])
        }
        async fn create_task(&self, _: &NewTask) -> Result<Compact, ClientError> {
            unreachable!()
        }
        async fn search_tasks(&self, _: &str, _: &TaskSearch) -> Result<Vec<Compact>, ClientError> {
            Ok(vec![])
        }
        async fn create_webhook(&self, _: &WebhookSpec) -> Result<Compact, ClientError> {
            unreachable!()
        }
    }

    fn remote_task() -> Value {
        json!({
            "gid": "1201046407912294",
            "name": "Renew certificates",
            "notes": "before friday",
            "completed": true,
            "completed_at": "2021-09-28T18:39:13.594Z",
            "memberships": [{"project": {"gid": "1", "name": "Tech Workflow"}, "section": {"gid": "2", "name": "Done"}}],
            "custom_fields": [
                {"gid": "100", "type": "enum", "enum_value": {"gid": "101", "name": "Expedite"}}
            ]
        })
    }

    fn synchronizer() -> TaskSynchronizer {
        let asana = StaticAsana(HashMap::from([("1201046407912294".to_string(), remote_task())]));
        let mappings: FieldMappings = serde_json::from_value(json!({
            "100": {"column": "class_of_service", "options": {"101": "expedite"}}
        }))
        .unwrap();
        TaskSynchronizer::new(Arc::new(asana), Arc::new(mappings))
    }

    #[test]
    fn test_task_ids_are_deduplicated_in_order() {
        let events = vec![
            json!({"resource": {"gid": "2"}}),
            json!({"resource": {"gid": "1"}}),
            json!({"resource": {"gid": "2"}}),
        ];
        assert_eq!(TaskSynchronizer::task_ids(&events).unwrap(), vec!["2", "1"]);
    }

    #[test]
    fn test_task_ids_reject_malformed_event() {
        let events = vec![json!({"resource": {"gid": "1"}}), json!({"glitch": "in matrix"})];
        assert!(matches!(
            TaskSynchronizer::task_ids(&events),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_first_sync_creates_task_with_full_change() {
        let sync = synchronizer();
        let store = Store::open_in_memory().unwrap();
        let remote = sync.fetch(&["1201046407912294".to_string()]).await.unwrap();

        let synced = store
            .unit_of_work(|uow| sync.persist(uow, &remote))
            .unwrap();
        assert_eq!(synced.len(), 1);
        let first = &synced[0];
        assert!(first.created);
        assert_eq!(first.task.name, "Renew certificates");
        assert_eq!(first.task.description.as_deref(), Some("before friday"));
        assert_eq!(first.task.section.as_deref(), Some("Done"));
        assert_eq!(first.task.class_of_service.as_deref(), Some("expedite"));
        assert!(first.task.completed_at.is_some());
        assert_eq!(first.change.changes[&TaskField::ClassOfService], json!("expedite"));
        assert!(!first.change.changes.contains_key(&TaskField::TaskProgress));
    }

    #[tokio::test]
    async fn test_identical_resync_records_empty_change() {
        let sync = synchronizer();
        let store = Store::open_in_memory().unwrap();
        let remote = sync.fetch(&["1201046407912294".to_string()]).await.unwrap();

        store.unit_of_work(|uow| sync.persist(uow, &remote)).unwrap();
        let second = store.unit_of_work(|uow| sync.persist(uow, &remote)).unwrap();

        assert!(!second[0].created);
        assert!(second[0].change.is_empty());
        let history = store
            .unit_of_work(|uow| uow.task_changes(&second[0].task.id))
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(store.unit_of_work(|uow| uow.count_tasks()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let sync = synchronizer();
        let err = sync.fetch(&["missing".to_string()]).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 404, .. }));
    }

    #[test]
    fn test_bad_completed_at_aborts_persist() {
        let sync = synchronizer();
        let store = Store::open_in_memory().unwrap();
        let mut remote: AsanaTask = serde_json::from_value(remote_task()).unwrap();
        remote.completed_at = Some("yesterday".into());

        let result = store.unit_of_work(|uow| sync.persist(uow, &[remote]));
        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(
            store
                .unit_of_work(|uow| Ok::<_, StoreError>(uow.count_tasks()?))
                .unwrap(),
            0
        );
    }
}
