//! Operator command line.
//!
//! - `serve` -- run the HTTP server
//! - `asana ...` -- inspect the remote workspace, manage webhooks, mirror projects
//! - `team ...` -- manage teams, people, projects, rituals and send the digest

mod asana;
mod team;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Config, Mappings};
use crate::store::Store;

#[derive(Parser, Debug)]
#[command(
    name = "hookrelay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Relay between Asana webhooks, Slack and a local mirror"
)]
pub struct Cli {
    /// SQLite database file
    #[arg(long, env = "HOOKRELAY_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// JSON mappings file (custom fields, workflow, digest)
    #[arg(long, env = "HOOKRELAY_MAPPINGS", global = true)]
    pub mappings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server.
    Serve {
        /// Listen address
        #[arg(long, env = "HOOKRELAY_BIND")]
        bind: Option<String>,
    },

    /// Talk to the Asana workspace.
    #[command(subcommand)]
    Asana(AsanaCommand),

    /// Manage teams and their members.
    #[command(subcommand)]
    Team(TeamCommand),
}

#[derive(Subcommand, Debug)]
pub enum AsanaCommand {
    /// List workspaces visible to the token.
    ListWorkspaces,

    /// List webhooks of the configured workspace.
    ListWebhooks,

    /// List projects of the configured workspace.
    ListProjects,

    /// Print one project.
    ShowProject { project_id: String },

    /// Print one task.
    ShowTask { task_id: String },

    /// Subscribe to projects added to the workspace.
    CreateProjectsWebhook,

    /// Subscribe to task changes in a project and mirror them locally.
    CreateTasksWebhook { project_id: String },

    /// Subscribe to a workflow project and replicate template subtasks.
    CreateWorkflowWebhook { project_id: String },

    /// Delete a webhook remotely and forget it locally.
    DeleteWebhook { webhook_id: String },

    /// Mirror customer and workflow projects locally.
    AddProjects {
        /// Mirror every project of the workspace
        #[arg(long)]
        all: bool,
    },

    /// Print a custom field mapping skeleton for a project.
    GenerateCustomFieldMap { project_id: String },
}

#[derive(Subcommand, Debug)]
pub enum TeamCommand {
    /// Create a team.
    AddTeam { name: String },

    /// Create a person.
    AddTessera {
        name: String,
        asana_id: String,
        github_handle: String,
        slack_id: String,
    },

    AddTesseraToTeam { tessera_id: String, team_id: String },

    RemoveTesseraFromTeam { tessera_id: String, team_id: String },

    /// Link a mirrored project (by Asana id) to a team.
    AddProjectToTeam { project_id: String, team_id: String },

    RemoveProjectFromTeam { project_id: String, team_id: String },

    /// Create a ritual for the `/ritual` slash command.
    AddRitual {
        name: String,
        team_id: Option<String>,
        #[arg(long)]
        logs_url: Option<String>,
        #[arg(long)]
        meeting_url: Option<String>,
    },

    /// Send the daily digest for a team (default team when omitted).
    Stick { team_id: Option<String> },
}

/// Everything a command needs, built once from the environment
pub(crate) struct Context {
    pub config: Config,
    pub mappings: Mappings,
}

impl Context {
    fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = Config::from_env();
        if let Some(database) = &cli.database {
            config.database_path = database.clone();
        }
        if let Some(mappings) = &cli.mappings {
            config.mappings_path = Some(mappings.clone());
        }
        let mappings = config.load_mappings()?;
        Ok(Self { config, mappings })
    }

    fn open_store(&self) -> anyhow::Result<Store> {
        Ok(Store::open(&self.config.database_path)?)
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut ctx = Context::load(&cli)?;
    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                ctx.config.bind = bind;
            }
            crate::server::serve(ctx.config).await
        }
        Command::Asana(command) => asana::run(&ctx, command).await,
        Command::Team(command) => team::run(&ctx, command).await,
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_commands() {
        let cli = Cli::try_parse_from([
            "hookrelay",
            "--database",
            "/tmp/relay.db",
            "asana",
            "create-tasks-webhook",
            "1200",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/relay.db")));
        assert!(matches!(
            cli.command,
            Command::Asana(AsanaCommand::CreateTasksWebhook { project_id }) if project_id == "1200"
        ));

        let cli = Cli::try_parse_from(["hookrelay", "team", "stick"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Team(TeamCommand::Stick { team_id: None })
        ));

        let cli = Cli::try_parse_from(["hookrelay", "asana", "add-projects", "--all"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Asana(AsanaCommand::AddProjects { all: true })
        ));
    }
}
