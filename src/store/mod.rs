//! SQLite-backed local mirror.
//!
//! A single connection is shared behind a mutex. Every write happens inside a
//! [`UnitOfWork`], which wraps one SQLite transaction: it commits when the
//! closure returns `Ok` and rolls back otherwise, so a request either lands all
//! of its rows or none.

mod events;
pub mod models;
mod projects;
mod tasks;
mod teams;
mod webhooks;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use tracing::debug;

pub use models::{
    Event, Project, ResourceType, Ritual, Task, TaskChange, TaskField, TaskSnapshot, Team,
    Tessera, Webhook,
};

/// Bumped whenever `migrate` gains a step
const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: String },

    /// The webhook already holds a secret; it is never overwritten
    #[error("webhook secret already set")]
    SecretAlreadySet,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub(crate) fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        Self::UnknownId {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside one transaction.
    ///
    /// The closure must not await: the connection stays locked until it
    /// returns.
    pub fn unit_of_work<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&UnitOfWork<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let uow = UnitOfWork { tx };
        let value = f(&uow)?;
        uow.tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

/// One request's worth of reads and writes
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }
    debug!(from = version, to = SCHEMA_VERSION, "migrating store schema");
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS asana_project (
          id TEXT PRIMARY KEY,
          external_id TEXT NOT NULL UNIQUE,
          name TEXT NOT NULL,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_asana_project_name ON asana_project(name);

        CREATE TABLE IF NOT EXISTS asana_webhook (
          id TEXT PRIMARY KEY,
          external_id TEXT,
          path TEXT NOT NULL UNIQUE,
          resource_type TEXT NOT NULL,
          secret TEXT,
          project_id TEXT REFERENCES asana_project(id)
        );
        CREATE INDEX IF NOT EXISTS ix_asana_webhook_external_id ON asana_webhook(external_id);

        CREATE TABLE IF NOT EXISTS asana_event (
          id TEXT PRIMARY KEY,
          webhook_id TEXT NOT NULL REFERENCES asana_webhook(id),
          content TEXT NOT NULL,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS asana_task (
          id TEXT PRIMARY KEY,
          external_id TEXT NOT NULL UNIQUE,
          name TEXT NOT NULL,
          description TEXT,
          completed INTEGER NOT NULL DEFAULT 0,
          completed_at TEXT,
          class_of_service TEXT,
          task_progress TEXT,
          item_category TEXT,
          related_service TEXT,
          section TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_asana_task_name ON asana_task(name);

        CREATE TABLE IF NOT EXISTS asana_task_change (
          id TEXT PRIMARY KEY,
          task_id TEXT NOT NULL REFERENCES asana_task(id),
          changes TEXT NOT NULL,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_asana_task_change_task ON asana_task_change(task_id);

        CREATE TABLE IF NOT EXISTS team (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS tessera (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          asana_id TEXT NOT NULL,
          github_handle TEXT NOT NULL,
          slack_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS team_tessera_association (
          team_id TEXT NOT NULL REFERENCES team(id),
          tessera_id TEXT NOT NULL REFERENCES tessera(id),
          PRIMARY KEY (team_id, tessera_id)
        );

        CREATE TABLE IF NOT EXISTS team_project_association (
          team_id TEXT NOT NULL REFERENCES team(id),
          project_id TEXT NOT NULL REFERENCES asana_project(id),
          PRIMARY KEY (team_id, project_id)
        );

        CREATE TABLE IF NOT EXISTS ritual (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          team_id TEXT REFERENCES team(id),
          logs_url TEXT,
          meeting_url TEXT
        );
        "#,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_unit_of_work_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.unit_of_work(|uow| {
            uow.insert_team("Tech")?;
            Err(StoreError::InvalidInput("boom".into()))
        });
        assert!(result.is_err());

        let teams = store
            .unit_of_work(|uow| uow.list_teams())
            .unwrap();
        assert!(teams.is_empty());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");
        let store = Store::open(&path).unwrap();
        store.unit_of_work(|uow| uow.insert_team("Tech")).unwrap();
        assert!(path.exists());
    }
}
