use std::sync::Arc;

use anyhow::anyhow;

use super::{Context, TeamCommand};
use crate::digest::DailyDigest;
use crate::integrations::{AsanaClient, SlackClient};
use crate::jobs::Jobs;
use crate::store::{Project, Store, StoreError, UnitOfWork};

pub(super) async fn run(ctx: &Context, command: TeamCommand) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    match command {
        TeamCommand::AddTeam { name } => {
            let team = store.unit_of_work(|uow| uow.insert_team(&name))?;
            println!("team {} created with id {}", team.name, team.id);
        }
        TeamCommand::AddTessera {
            name,
            asana_id,
            github_handle,
            slack_id,
        } => {
            let tessera = store.unit_of_work(|uow| {
                uow.insert_tessera(&name, &asana_id, &github_handle, &slack_id)
            })?;
            println!("tessera {} created with id {}", tessera.name, tessera.id);
        }
        TeamCommand::AddTesseraToTeam {
            tessera_id,
            team_id,
        } => {
            store.unit_of_work(|uow| uow.add_tessera_to_team(&tessera_id, &team_id))?;
            println!("tessera {tessera_id} joined team {team_id}");
        }
        TeamCommand::RemoveTesseraFromTeam {
            tessera_id,
            team_id,
        } => {
            store.unit_of_work(|uow| uow.remove_tessera_from_team(&tessera_id, &team_id))?;
            println!("tessera {tessera_id} left team {team_id}");
        }
        TeamCommand::AddProjectToTeam {
            project_id,
            team_id,
        } => {
            with_project(&store, &project_id, |uow, project| {
                uow.add_project_to_team(&project.id, &team_id)
            })?;
            println!("project {project_id} linked to team {team_id}");
        }
        TeamCommand::RemoveProjectFromTeam {
            project_id,
            team_id,
        } => {
            with_project(&store, &project_id, |uow, project| {
                uow.remove_project_from_team(&project.id, &team_id).map(|_| ())
            })?;
            println!("project {project_id} unlinked from team {team_id}");
        }
        TeamCommand::AddRitual {
            name,
            team_id,
            logs_url,
            meeting_url,
        } => {
            let ritual = store.unit_of_work(|uow| {
                uow.insert_ritual(
                    &name,
                    team_id.as_deref(),
                    logs_url.as_deref(),
                    meeting_url.as_deref(),
                )
            })?;
            println!("ritual {} created with id {}", ritual.name, ritual.id);
        }
        TeamCommand::Stick { team_id } => stick(ctx, store, team_id).await?,
    }
    Ok(())
}

/// Run `f` against a mirrored project looked up by its Asana id
fn with_project<F>(store: &Store, external_id: &str, f: F) -> anyhow::Result<()>
where
    F: FnOnce(&UnitOfWork<'_>, &Project) -> Result<(), StoreError>,
{
    store.unit_of_work(|uow| {
        let project = uow
            .project_by_external_id(external_id)?
            .ok_or_else(|| anyhow!("project {external_id} is not mirrored locally"))?;
        f(uow, &project)?;
        Ok::<_, anyhow::Error>(())
    })
}

async fn stick(ctx: &Context, store: Store, team_id: Option<String>) -> anyhow::Result<()> {
    let config = &ctx.config;
    if config.slack_channel.is_empty() {
        anyhow::bail!("SLACK_BLOCKS_CHANNEL must be set to send the digest");
    }
    let digest = DailyDigest::new(
        Arc::new(AsanaClient::new(
            config.asana_base_url.clone(),
            config.asana_token.clone(),
            config.http_timeout,
        )),
        Arc::new(SlackClient::new(
            config.slack_base_url.clone(),
            config.slack_token.clone(),
            config.http_timeout,
        )),
        ctx.mappings.digest.clone(),
        config.asana_workspace.clone(),
        config.slack_channel.clone(),
    );

    let jobs = Jobs::new();
    let handle = jobs.submit("daily-digest", async move {
        digest.run(&store, team_id.as_deref()).await
    });
    let report = handle.wait().await?;

    println!(
        "digest for {}: {} sent, {} failed",
        report.team,
        report.sent.len(),
        report.failed.len()
    );
    for (member, reason) in &report.failed {
        println!("  {member}: {reason}");
    }
    Ok(())
}
