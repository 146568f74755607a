use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::{print_json, AsanaCommand, Context};
use crate::integrations::asana::AsanaProject;
use crate::integrations::AsanaClient;
use crate::store::TaskField;
use crate::webhooks::{Registration, WebhookRegistry};

pub(super) async fn run(ctx: &Context, command: AsanaCommand) -> anyhow::Result<()> {
    let config = &ctx.config;
    let client = AsanaClient::new(
        config.asana_base_url.clone(),
        config.asana_token.clone(),
        config.http_timeout,
    );
    let workspace = config.asana_workspace.as_str();

    match command {
        AsanaCommand::ListWorkspaces => print_json(&client.workspaces().await?),
        AsanaCommand::ListWebhooks => print_json(&client.webhooks(workspace).await?),
        AsanaCommand::ListProjects => print_json(&client.projects(workspace).await?),
        AsanaCommand::ShowProject { project_id } => {
            print_json(&client.get_json(&format!("/projects/{project_id}")).await?)
        }
        AsanaCommand::ShowTask { task_id } => {
            print_json(&client.get_json(&format!("/tasks/{task_id}")).await?)
        }
        AsanaCommand::CreateProjectsWebhook => {
            register(ctx, client, Registration::projects(workspace)).await
        }
        AsanaCommand::CreateTasksWebhook { project_id } => {
            register(ctx, client, Registration::tasks(&project_id)).await
        }
        AsanaCommand::CreateWorkflowWebhook { project_id } => {
            register(ctx, client, Registration::workflow(&project_id)).await
        }
        AsanaCommand::DeleteWebhook { webhook_id } => {
            let response = client.delete_webhook(&webhook_id).await?;
            let removed = ctx
                .open_store()?
                .unit_of_work(|uow| uow.delete_webhook_by_external_id(&webhook_id))?;
            if !removed {
                tracing::warn!(webhook = %webhook_id, "webhook was not registered locally");
            }
            print_json(&response)
        }
        AsanaCommand::AddProjects { all } => add_projects(ctx, &client, all).await,
        AsanaCommand::GenerateCustomFieldMap { project_id } => {
            let project = client.project(&project_id).await?;
            print_json(&custom_field_skeleton(&project))
        }
    }
}

async fn register(
    ctx: &Context,
    client: AsanaClient,
    registration: Registration,
) -> anyhow::Result<()> {
    if ctx.config.asana_workspace.is_empty() && registration.project.is_none() {
        anyhow::bail!("ASANA_WORKSPACE must be set to watch the workspace");
    }
    let registry = WebhookRegistry::new(ctx.open_store()?);
    let webhook = registry
        .register(&client, &ctx.config.server_base_uri, &registration)
        .await
        .with_context(|| format!("registering {}", registration.path))?;
    print_json(&json!({
        "id": webhook.id,
        "external_id": webhook.external_id,
        "path": webhook.path,
        "resource_type": webhook.resource_type,
        "confirmed": webhook.is_confirmed(),
    }))
}

/// Mirror customer and workflow projects (or every project with `all`)
async fn add_projects(ctx: &Context, client: &AsanaClient, all: bool) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let settings = &ctx.mappings.workflow;
    let mut added = 0usize;

    for compact in client.projects(&ctx.config.asana_workspace).await? {
        let name = compact.name();
        if !(all || settings.is_customer_project(name) || settings.is_workflow_project(name)) {
            continue;
        }
        let known = store
            .unit_of_work(|uow| uow.project_by_external_id(&compact.gid))?
            .is_some();
        if known {
            continue;
        }

        let project = client.project(&compact.gid).await?;
        let created_at = parse_or_now(project.created_at.as_deref());
        let updated_at = parse_or_now(project.modified_at.as_deref());
        store.unit_of_work(|uow| {
            uow.insert_project(&project.gid, &project.name, created_at, updated_at)
        })?;
        tracing::debug!(project = %project.gid, name = %project.name, "project mirrored");
        added += 1;
    }

    println!("{added} new projects added");
    Ok(())
}

fn parse_or_now(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// `{"custom_fields": {gid: {name, column, options}}}` for every enum field.
/// The column is guessed from the field name and left null when unknown.
fn custom_field_skeleton(project: &AsanaProject) -> Value {
    let mut fields = Map::new();
    for setting in &project.custom_field_settings {
        let field = &setting.custom_field;
        if !field.is_enum() {
            continue;
        }
        let name = field.name.clone().unwrap_or_default();
        let options: Map<String, Value> = field
            .enum_options
            .iter()
            .map(|option| (option.gid.clone(), Value::String(option.name.clone())))
            .collect();
        fields.insert(
            field.gid.clone(),
            json!({
                "name": name,
                "column": guess_column(&name),
                "options": options,
            }),
        );
    }
    json!({ "custom_fields": fields })
}

fn guess_column(field_name: &str) -> Option<TaskField> {
    let normalized = field_name.trim().to_lowercase().replace([' ', '-'], "_");
    TaskField::ALL
        .iter()
        .copied()
        .find(|column| column.is_classification() && column.as_str() == normalized)
}
