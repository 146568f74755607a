use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::models::Project;
use super::{new_id, StoreError, UnitOfWork};

const PROJECT_COLUMNS: &str = "id, external_id, name, created_at, updated_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl UnitOfWork<'_> {
    pub fn insert_project(
        &self,
        external_id: &str,
        name: &str,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Project, StoreError> {
        let project = Project {
            id: new_id(),
            external_id: external_id.to_string(),
            name: name.to_string(),
            created_at,
            updated_at,
        };
        self.tx.execute(
            "INSERT INTO asana_project (id, external_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.external_id,
                project.name,
                project.created_at,
                project.updated_at
            ],
        )?;
        Ok(project)
    }

    pub fn project_by_external_id(&self, external_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM asana_project WHERE external_id = ?1"),
                params![external_id],
                project_from_row,
            )
            .optional()?)
    }

    pub fn project(&self, id: &str) -> Result<Project, StoreError> {
        self.tx
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM asana_project WHERE id = ?1"),
                params![id],
                project_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::unknown("project", id))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let mut stmt = self
            .tx
            .prepare(&format!("SELECT {PROJECT_COLUMNS} FROM asana_project ORDER BY name"))?;
        let rows = stmt.query_map([], project_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::store::{Store, StoreError};

    #[test]
    fn test_project_lookup_by_external_id() {
        let store = Store::open_in_memory().unwrap();
        let created = store
            .unit_of_work(|uow| uow.insert_project("1200", "P - Acme", Utc::now(), Utc::now()))
            .unwrap();

        let found = store
            .unit_of_work(|uow| uow.project_by_external_id("1200"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "P - Acme");
        assert!(store
            .unit_of_work(|uow| uow.project_by_external_id("9999"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_external_id_is_unique() {
        let store = Store::open_in_memory().unwrap();
        store
            .unit_of_work(|uow| uow.insert_project("1200", "One", Utc::now(), Utc::now()))
            .unwrap();
        let second =
            store.unit_of_work(|uow| uow.insert_project("1200", "Two", Utc::now(), Utc::now()));
        assert!(matches!(second, Err(StoreError::Sql(_))));
    }
}
