use rusqlite::{params, OptionalExtension, Row};

use super::models::{Project, Ritual, Team, Tessera};
use super::{new_id, StoreError, UnitOfWork};

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn tessera_from_row(row: &Row<'_>) -> rusqlite::Result<Tessera> {
    Ok(Tessera {
        id: row.get(0)?,
        name: row.get(1)?,
        asana_id: row.get(2)?,
        github_handle: row.get(3)?,
        slack_id: row.get(4)?,
    })
}

fn ritual_from_row(row: &Row<'_>) -> rusqlite::Result<Ritual> {
    Ok(Ritual {
        id: row.get(0)?,
        name: row.get(1)?,
        team_id: row.get(2)?,
        logs_url: row.get(3)?,
        meeting_url: row.get(4)?,
    })
}

impl UnitOfWork<'_> {
    pub fn insert_team(&self, name: &str) -> Result<Team, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("team name must not be empty".into()));
        }
        let team = Team {
            id: new_id(),
            name: name.to_string(),
        };
        self.tx.execute(
            "INSERT INTO team (id, name) VALUES (?1, ?2)",
            params![team.id, team.name],
        )?;
        Ok(team)
    }

    pub fn team(&self, id: &str) -> Result<Team, StoreError> {
        self.tx
            .query_row(
                "SELECT id, name FROM team WHERE id = ?1",
                params![id],
                team_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::unknown("team", id))
    }

    pub fn team_by_name(&self, name: &str) -> Result<Option<Team>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, name FROM team WHERE name = ?1",
                params![name],
                team_from_row,
            )
            .optional()?)
    }

    pub fn list_teams(&self) -> Result<Vec<Team>, StoreError> {
        let mut stmt = self.tx.prepare("SELECT id, name FROM team ORDER BY name")?;
        let rows = stmt.query_map([], team_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_tessera(
        &self,
        name: &str,
        asana_id: &str,
        github_handle: &str,
        slack_id: &str,
    ) -> Result<Tessera, StoreError> {
        let tessera = Tessera {
            id: new_id(),
            name: name.to_string(),
            asana_id: asana_id.to_string(),
            github_handle: github_handle.to_string(),
            slack_id: slack_id.to_string(),
        };
        self.tx.execute(
            "INSERT INTO tessera (id, name, asana_id, github_handle, slack_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tessera.id,
                tessera.name,
                tessera.asana_id,
                tessera.github_handle,
                tessera.slack_id
            ],
        )?;
        Ok(tessera)
    }

    pub fn tessera(&self, id: &str) -> Result<Tessera, StoreError> {
        self.tx
            .query_row(
                "SELECT id, name, asana_id, github_handle, slack_id FROM tessera WHERE id = ?1",
                params![id],
                tessera_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::unknown("tessera", id))
    }

    pub fn add_tessera_to_team(&self, tessera_id: &str, team_id: &str) -> Result<(), StoreError> {
        self.tessera(tessera_id)?;
        self.team(team_id)?;
        self.tx.execute(
            "INSERT OR IGNORE INTO team_tessera_association (team_id, tessera_id) VALUES (?1, ?2)",
            params![team_id, tessera_id],
        )?;
        Ok(())
    }

    pub fn remove_tessera_from_team(
        &self,
        tessera_id: &str,
        team_id: &str,
    ) -> Result<bool, StoreError> {
        let deleted = self.tx.execute(
            "DELETE FROM team_tessera_association WHERE team_id = ?1 AND tessera_id = ?2",
            params![team_id, tessera_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn team_tesseras(&self, team_id: &str) -> Result<Vec<Tessera>, StoreError> {
        let mut stmt = self.tx.prepare(
            r#"
            SELECT t.id, t.name, t.asana_id, t.github_handle, t.slack_id
            FROM tessera t
            JOIN team_tessera_association a ON a.tessera_id = t.id
            WHERE a.team_id = ?1
            ORDER BY t.name
            "#,
        )?;
        let rows = stmt.query_map(params![team_id], tessera_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn add_project_to_team(&self, project_id: &str, team_id: &str) -> Result<(), StoreError> {
        self.project(project_id)?;
        self.team(team_id)?;
        self.tx.execute(
            "INSERT OR IGNORE INTO team_project_association (team_id, project_id) VALUES (?1, ?2)",
            params![team_id, project_id],
        )?;
        Ok(())
    }

    pub fn remove_project_from_team(
        &self,
        project_id: &str,
        team_id: &str,
    ) -> Result<bool, StoreError> {
        let deleted = self.tx.execute(
            "DELETE FROM team_project_association WHERE team_id = ?1 AND project_id = ?2",
            params![team_id, project_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn team_projects(&self, team_id: &str) -> Result<Vec<Project>, StoreError> {
        let mut stmt = self.tx.prepare(
            r#"
            SELECT p.id, p.external_id, p.name, p.created_at, p.updated_at
            FROM asana_project p
            JOIN team_project_association a ON a.project_id = p.id
            WHERE a.team_id = ?1
            ORDER BY p.name
            "#,
        )?;
        let rows = stmt.query_map(params![team_id], |row| {
            Ok(Project {
                id: row.get(0)?,
                external_id: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn insert_ritual(
        &self,
        name: &str,
        team_id: Option<&str>,
        logs_url: Option<&str>,
        meeting_url: Option<&str>,
    ) -> Result<Ritual, StoreError> {
        if let Some(team_id) = team_id {
            self.team(team_id)?;
        }
        let ritual = Ritual {
            id: new_id(),
            name: name.to_string(),
            team_id: team_id.map(str::to_string),
            logs_url: logs_url.map(str::to_string),
            meeting_url: meeting_url.map(str::to_string),
        };
        self.tx.execute(
            "INSERT INTO ritual (id, name, team_id, logs_url, meeting_url) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ritual.id,
                ritual.name,
                ritual.team_id,
                ritual.logs_url,
                ritual.meeting_url
            ],
        )?;
        Ok(ritual)
    }

    pub fn ritual_by_name(&self, name: &str) -> Result<Option<Ritual>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, name, team_id, logs_url, meeting_url FROM ritual WHERE name = ?1",
                params![name],
                ritual_from_row,
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::store::{Store, StoreError};

    #[test]
    fn test_team_membership_graph() {
        let store = Store::open_in_memory().unwrap();
        let (team, tessera, project) = store
            .unit_of_work(|uow| {
                let team = uow.insert_team("Tech")?;
                let tessera = uow.insert_tessera("Ada", "1200279241225750", "ada", "U01ADA")?;
                let project = uow.insert_project("1201", "Tech Workflow", Utc::now(), Utc::now())?;
                uow.add_tessera_to_team(&tessera.id, &team.id)?;
                uow.add_project_to_team(&project.id, &team.id)?;
                // linking twice is a no-op
                uow.add_tessera_to_team(&tessera.id, &team.id)?;
                Ok::<_, StoreError>((team, tessera, project))
            })
            .unwrap();

        let members = store.unit_of_work(|uow| uow.team_tesseras(&team.id)).unwrap();
        assert_eq!(members, vec![tessera.clone()]);
        let projects = store.unit_of_work(|uow| uow.team_projects(&team.id)).unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, project.id);

        let removed = store
            .unit_of_work(|uow| uow.remove_tessera_from_team(&tessera.id, &team.id))
            .unwrap();
        assert!(removed);
        let removed = store
            .unit_of_work(|uow| uow.remove_project_from_team(&project.id, &team.id))
            .unwrap();
        assert!(removed);
        assert!(store
            .unit_of_work(|uow| uow.team_tesseras(&team.id))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_link_unknown_team_fails() {
        let store = Store::open_in_memory().unwrap();
        let result = store.unit_of_work(|uow| {
            let tessera = uow.insert_tessera("Ada", "1", "ada", "U1")?;
            uow.add_tessera_to_team(&tessera.id, "missing")
        });
        assert!(matches!(result, Err(StoreError::UnknownId { kind: "team", .. })));
    }

    #[test]
    fn test_ritual_lookup_by_name() {
        let store = Store::open_in_memory().unwrap();
        store
            .unit_of_work(|uow| {
                let team = uow.insert_team("Tech")?;
                uow.insert_ritual("retro", Some(&team.id), None, Some("https://meet.example.com/retro"))
            })
            .unwrap();
        let ritual = store
            .unit_of_work(|uow| uow.ritual_by_name("retro"))
            .unwrap()
            .unwrap();
        assert_eq!(ritual.meeting_url.as_deref(), Some("https://meet.example.com/retro"));
        assert!(ritual.logs_url.is_none());
        assert!(store
            .unit_of_work(|uow| uow.ritual_by_name("christmas"))
            .unwrap()
            .is_none());
    }
}
