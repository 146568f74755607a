//! Daily digest: one chat message per team member listing their in-progress
//! tasks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::integrations::{AsanaApi, AsanaTask, ClientError, SlackApi, TaskSearch};
use crate::store::{Store, StoreError, Team, Tessera};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DigestSettings {
    /// Team used when none is named
    pub default_team: String,

    /// Enum custom field holding the task progress
    pub progress_field: String,
    pub in_progress_option: String,

    pub class_of_service_field: String,

    /// Class-of-service option gid → emoji
    pub class_glyphs: HashMap<String, String>,

    /// Item category field gid → emoji shown before the option name
    pub item_fields: HashMap<String, String>,

    /// Appended to the member mention
    pub greeting: String,

    pub task_link_base: String,
}

impl Default for DigestSettings {
    fn default() -> Self {
        let glyphs = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>()
        };
        Self {
            default_team: "Tech".to_string(),
            progress_field: "1200200605652836".to_string(),
            in_progress_option: "1200200605652838".to_string(),
            class_of_service_field: "1200760323623705".to_string(),
            class_glyphs: glyphs(&[
                ("1200760323624685", ":rocket:"),
                ("1200760323624695", ":bomb:"),
                ("1200760323630880", ":black_square_button:"),
                ("1200760323631982", ":brain:"),
            ]),
            item_fields: glyphs(&[
                ("1200760343663992", ":large_green_square:"),
                ("1200765868551790", ":large_blue_square:"),
            ]),
            greeting: ":robot_face: :wave:".to_string(),
            task_link_base: "https://app.asana.com/0".to_string(),
        }
    }
}

const NO_CLASS: &str = ":memo:";
const UNKNOWN_CLASS: &str = ":chipmunk:";
const NO_SECTION: &str = ":fairy:";
const NO_ITEM: &str = ":dragon:";
const FOOTER: &str = "\n:speech_balloon: -> :thread:\n";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigestReport {
    pub team: String,
    /// Members whose message went out
    pub sent: Vec<String>,
    /// Members whose message failed, with the reason
    pub failed: Vec<(String, String)>,
}

pub struct DailyDigest {
    asana: Arc<dyn AsanaApi>,
    slack: Arc<dyn SlackApi>,
    settings: DigestSettings,
    workspace: String,
    channel: String,
}

/// Team, members and project gids, read in one unit of work
struct Roster {
    team: Team,
    members: Vec<Tessera>,
    projects: Vec<String>,
}

impl DailyDigest {
    pub fn new(
        asana: Arc<dyn AsanaApi>,
        slack: Arc<dyn SlackApi>,
        settings: DigestSettings,
        workspace: String,
        channel: String,
    ) -> Self {
        Self {
            asana,
            slack,
            settings,
            workspace,
            channel,
        }
    }

    /// Send the digest for `team_id`, or for the default team
    pub async fn run(&self, store: &Store, team_id: Option<&str>) -> Result<DigestReport, AppError> {
        let roster = self.roster(store, team_id)?;
        let mut report = DigestReport {
            team: roster.team.name.clone(),
            ..Default::default()
        };

        for member in &roster.members {
            match self.send_member(member, &roster.projects).await {
                Ok(()) => report.sent.push(member.name.clone()),
                Err(e) => {
                    warn!(member = %member.name, error = %e, "digest message failed");
                    report.failed.push((member.name.clone(), e.to_string()));
                }
            }
        }
        info!(
            team = %report.team,
            sent = report.sent.len(),
            failed = report.failed.len(),
            "daily digest finished"
        );
        Ok(report)
    }

    fn roster(&self, store: &Store, team_id: Option<&str>) -> Result<Roster, AppError> {
        store.unit_of_work(|uow| {
            let team = match team_id {
                Some(id) => uow.team(id).map_err(|e| match e {
                    StoreError::UnknownId { .. } => AppError::NotFound(format!("Team {id} not found")),
                    other => other.into(),
                })?,
                None => uow.team_by_name(&self.settings.default_team)?.ok_or_else(|| {
                    AppError::NotFound(format!("Team {} not found", self.settings.default_team))
                })?,
            };
            let members = uow.team_tesseras(&team.id)?;
            let projects = uow
                .team_projects(&team.id)?
                .into_iter()
                .map(|project| project.external_id)
                .collect();
            Ok(Roster {
                team,
                members,
                projects,
            })
        })
    }

    async fn send_member(&self, member: &Tessera, projects: &[String]) -> Result<(), ClientError> {
        // an empty project filter would search the whole workspace
        if projects.is_empty() {
            let message = self.format_message(member, &[], projects);
            return self.slack.post_message(&self.channel, &message).await;
        }
        let search = TaskSearch {
            assignee: member.asana_id.clone(),
            projects: projects.to_vec(),
            completed: false,
            is_subtask: false,
            custom_field_value: Some((
                self.settings.progress_field.clone(),
                self.settings.in_progress_option.clone(),
            )),
        };
        let mut tasks = Vec::new();
        for found in self.asana.search_tasks(&self.workspace, &search).await? {
            tasks.push(self.asana.task(&found.gid).await?);
        }
        let message = self.format_message(member, &tasks, projects);
        self.slack.post_message(&self.channel, &message).await
    }

    pub fn format_message(&self, member: &Tessera, tasks: &[AsanaTask], projects: &[String]) -> String {
        let team_projects: HashSet<&str> = projects.iter().map(String::as_str).collect();
        let mut message = format!("<@{}|{}> {}", member.slack_id, member.name, self.settings.greeting);
        for task in tasks {
            message.push_str(&format!(
                "\n\t -  <{}/{}/{}/f|{}> \t{} {} {}",
                self.settings.task_link_base,
                self.workspace,
                task.gid,
                task.name,
                self.class_glyph(task),
                section_in(task, &team_projects).unwrap_or(NO_SECTION),
                self.item_glyph(task).as_deref().unwrap_or(NO_ITEM),
            ));
        }
        message.push_str(FOOTER);
        message
    }

    fn class_glyph(&self, task: &AsanaTask) -> &str {
        let Some(field) = task
            .custom_fields
            .iter()
            .find(|field| field.gid == self.settings.class_of_service_field)
        else {
            return NO_CLASS;
        };
        field
            .enum_value
            .as_ref()
            .and_then(|option| self.settings.class_glyphs.get(&option.gid))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CLASS)
    }

    /// Last item-category field with a chosen option wins
    fn item_glyph(&self, task: &AsanaTask) -> Option<String> {
        task.custom_fields
            .iter()
            .filter_map(|field| {
                let glyph = self.settings.item_fields.get(&field.gid)?;
                let option = field.enum_value.as_ref()?;
                Some(format!("{glyph} {}", option.name))
            })
            .last()
    }
}

/// Section of the last membership in one of the team's projects
fn section_in<'a>(task: &'a AsanaTask, team_projects: &HashSet<&str>) -> Option<&'a str> {
    task.memberships
        .iter()
        .filter(|membership| {
            membership
                .project
                .as_ref()
                .is_some_and(|project| team_projects.contains(project.gid.as_str()))
        })
        .filter_map(|membership| membership.section.as_ref()?.name.as_deref())
        .filter(|name| !name.is_empty())
        .last()
}
