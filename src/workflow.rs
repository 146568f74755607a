//! Customer workflow propagation.
//!
//! When a task in a workflow project moves into a section that has a template
//! task of the same name, every subtask of that template is replicated as a
//! new task in the customer project the task also belongs to. Replication is
//! best effort: the creations run as background jobs after the event row
//! commits, and a failed creation is not undone or retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::integrations::asana::NewMembership;
use crate::integrations::{AsanaApi, AsanaTask, ClientError, Compact, NewTask};
use crate::jobs::{JobHandle, Jobs};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Section holding one template task per workflow step
    pub template_section: String,

    /// Projects whose name starts with this are customer projects
    pub customer_prefix: String,

    /// Projects whose name ends with this are workflow projects
    pub workflow_suffix: String,

    /// Note attached to every replicated task
    pub marker_note: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            template_section: "1201165296613104".to_string(),
            customer_prefix: "P -".to_string(),
            workflow_suffix: "Workflow".to_string(),
            marker_note: "Replicated from the workflow template by hookrelay.".to_string(),
        }
    }
}

impl WorkflowSettings {
    pub fn is_customer_project(&self, name: &str) -> bool {
        name.starts_with(&self.customer_prefix)
    }

    pub fn is_workflow_project(&self, name: &str) -> bool {
        name.ends_with(&self.workflow_suffix)
    }
}

/// One task to create in a customer project
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    /// Task whose section change triggered the plan
    pub source_task: String,
    /// Template task the subtask came from
    pub template_task: String,
    pub task: NewTask,
}

pub struct WorkflowPropagator {
    asana: Arc<dyn AsanaApi>,
    settings: WorkflowSettings,
    workspace: String,
}

impl WorkflowPropagator {
    pub fn new(asana: Arc<dyn AsanaApi>, settings: WorkflowSettings, workspace: String) -> Self {
        Self {
            asana,
            settings,
            workspace,
        }
    }

    /// Task each event refers to: `task.gid`, or `parent.gid` when the parent is
    /// a task. Events without either key are malformed; a null or non-task
    /// parent is skipped.
    pub fn related_task_ids(events: &[Value]) -> Result<Vec<String>, AppError> {
        let malformed = || AppError::InvalidRequest("Incorrect event format".to_string());
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for event in events {
            let direct = event.get("task").filter(|task| !task.is_null());
            let id = match direct {
                Some(task) => Some(task.get("gid").and_then(Value::as_str).ok_or_else(malformed)?),
                None => {
                    let parent = event.get("parent").ok_or_else(malformed)?;
                    if parent.get("resource_type").and_then(Value::as_str) == Some("task") {
                        Some(parent.get("gid").and_then(Value::as_str).ok_or_else(malformed)?)
                    } else {
                        None
                    }
                }
            };
            if let Some(id) = id {
                if seen.insert(id.to_string()) {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Work out which tasks to create for a batch. Only reads from Asana.
    pub async fn plan(&self, events: &[Value]) -> Result<Vec<PlannedTask>, AppError> {
        let ids = Self::related_task_ids(events)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let templates: HashMap<String, String> = self
            .asana
            .section_tasks(&self.settings.template_section)
            .await?
            .into_iter()
            .filter_map(|task| task.name.clone().map(|name| (name, task.gid)))
            .collect();

        let mut planned = Vec::new();
        for id in ids {
            let task = self.asana.task(&id).await?;
            let Some((template_gid, customer)) = self.match_task(&task, &templates) else {
                debug!(task = %task.gid, "no template or customer project, skipped");
                continue;
            };
            for subtask in self.asana.subtasks(&template_gid).await? {
                planned.push(PlannedTask {
                    source_task: task.gid.clone(),
                    template_task: template_gid.clone(),
                    task: self.new_task(&subtask, &customer),
                });
            }
        }
        Ok(planned)
    }

    /// Submit one background job per planned task
    pub fn spawn(&self, jobs: &Jobs, planned: Vec<PlannedTask>) -> Vec<JobHandle<Compact>> {
        planned
            .into_iter()
            .map(|plan| {
                let asana = self.asana.clone();
                let name = format!("workflow:{}:{}", plan.source_task, plan.task.name);
                jobs.submit(name, async move {
                    let created = asana.create_task(&plan.task).await?;
                    info!(
                        task = %created.gid,
                        template = %plan.template_task,
                        "workflow task replicated"
                    );
                    Ok::<_, ClientError>(created)
                })
            })
            .collect()
    }

    /// Template task gid and customer membership for a task, if both exist
    fn match_task(
        &self,
        task: &AsanaTask,
        templates: &HashMap<String, String>,
    ) -> Option<(String, NewMembership)> {
        let template = task.memberships.iter().find_map(|membership| {
            let section = membership.section.as_ref()?.name.as_ref()?;
            templates.get(section).cloned()
        })?;

        let customer = task.memberships.iter().find(|membership| {
            membership
                .project
                .as_ref()
                .is_some_and(|project| self.settings.is_customer_project(project.name()))
        })?;
        let membership = NewMembership {
            project: customer.project.as_ref()?.gid.clone(),
            section: customer.section.as_ref()?.gid.clone(),
        };
        Some((template, membership))
    }

    fn new_task(&self, subtask: &Compact, customer: &NewMembership) -> NewTask {
        NewTask {
            name: subtask.name().to_string(),
            notes: self.settings.marker_note.clone(),
            projects: vec![customer.project.clone()],
            memberships: vec![customer.clone()],
            workspace: Some(self.workspace.clone()).filter(|ws| !ws.is_empty()),
        }
    }
}
