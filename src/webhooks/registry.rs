//! Webhook registry: request path → subscription.

use tracing::info;

use super::{tasks_path, workflow_path, PROJECTS_PATH};
use crate::errors::AppError;
use crate::integrations::asana::WebhookFilter;
use crate::integrations::{AsanaApi, WebhookSpec};
use crate::store::{ResourceType, Store, Webhook};

/// A subscription to create on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub path: String,
    /// Remote gid the subscription watches
    pub resource: String,
    pub resource_type: ResourceType,
    pub filters: Vec<WebhookFilter>,
    /// Local project to link, by remote gid
    pub project: Option<String>,
}

impl Registration {
    /// New projects appearing in the workspace
    pub fn projects(workspace: &str) -> Self {
        Self {
            path: PROJECTS_PATH.to_string(),
            resource: workspace.to_string(),
            resource_type: ResourceType::Project,
            filters: vec![filter(ResourceType::Project, Some("added"))],
            project: None,
        }
    }

    /// Any task change inside a project
    pub fn tasks(project: &str) -> Self {
        Self {
            path: tasks_path(project),
            resource: project.to_string(),
            resource_type: ResourceType::Task,
            filters: vec![filter(ResourceType::Task, None)],
            project: Some(project.to_string()),
        }
    }

    /// Stories on tasks of a workflow project, which carry section moves
    pub fn workflow(project: &str) -> Self {
        Self {
            path: workflow_path(project),
            resource: project.to_string(),
            resource_type: ResourceType::Story,
            filters: vec![filter(ResourceType::Story, None)],
            project: Some(project.to_string()),
        }
    }
}

fn filter(resource_type: ResourceType, action: Option<&str>) -> WebhookFilter {
    WebhookFilter {
        resource_type: resource_type.to_string(),
        action: action.map(str::to_string),
    }
}

#[derive(Clone)]
pub struct WebhookRegistry {
    store: Store,
}

impl WebhookRegistry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Find the subscription for `path`. For project-scoped routes the
    /// project must be mirrored locally and linked to that subscription.
    pub fn resolve(&self, path: &str, project: Option<&str>) -> Result<Webhook, AppError> {
        self.store.unit_of_work(|uow| {
            let webhook = uow
                .webhook_by_path(path)?
                .ok_or_else(|| AppError::NotFound("Webhook not found".to_string()))?;
            if let Some(external_id) = project {
                let project = uow
                    .project_by_external_id(external_id)?
                    .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
                if webhook.project_id.as_deref() != Some(project.id.as_str()) {
                    return Err(AppError::Mismatch(
                        "Webhook is not linked to this project".to_string(),
                    ));
                }
            }
            Ok(webhook)
        })
    }

    /// Create the local row, then the remote subscription.
    ///
    /// The row is committed first: Asana performs the handshake against
    /// `base_uri + path` before `create_webhook` returns. A row left behind
    /// by a failed remote call is reused on the next attempt.
    pub async fn register(
        &self,
        asana: &dyn AsanaApi,
        base_uri: &str,
        registration: &Registration,
    ) -> Result<Webhook, AppError> {
        let local = self.store.unit_of_work(|uow| {
            let project_id = match &registration.project {
                Some(external_id) => Some(
                    uow.project_by_external_id(external_id)?
                        .ok_or_else(|| {
                            AppError::NotFound(format!(
                                "Project {external_id} is not mirrored locally, run `asana add-projects` first"
                            ))
                        })?
                        .id,
                ),
                None => None,
            };
            match uow.webhook_by_path(&registration.path)? {
                Some(existing) if existing.external_id.is_none() => Ok(existing),
                Some(_) => Err(AppError::Mismatch(format!(
                    "{} is already registered",
                    registration.path
                ))),
                None => Ok(uow.insert_webhook(
                    &registration.path,
                    registration.resource_type,
                    project_id.as_deref(),
                )?),
            }
        })?;

        let spec = WebhookSpec {
            resource: registration.resource.clone(),
            target: format!("{}{}", base_uri.trim_end_matches('/'), registration.path),
            filters: registration.filters.clone(),
        };
        let remote = asana.create_webhook(&spec).await?;

        let webhook = self.store.unit_of_work(|uow| {
            uow.set_webhook_external_id(&local.id, &remote.gid)?;
            uow.webhook_by_path(&registration.path)?
                .ok_or_else(|| AppError::NotFound("Webhook not found".to_string()))
        })?;
        info!(
            path = %webhook.path,
            external_id = %remote.gid,
            confirmed = webhook.is_confirmed(),
            "webhook registered"
        );
        Ok(webhook)
    }
}
