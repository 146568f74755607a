//! hookrelay binary
//!
//! Environment (a `.env` file in the working directory is loaded first):
//!   HOOKRELAY_BIND        - listen address (default: 127.0.0.1:8080)
//!   HOOKRELAY_DATABASE    - SQLite file (default: hookrelay.db)
//!   HOOKRELAY_MAPPINGS    - JSON mappings file
//!   ASANA_TOKEN, ASANA_WORKSPACE
//!   SLACK_TOKEN, SLACK_BLOCKS_CHANNEL
//!   SERVER_BASE_URI       - public URI Asana calls back
//!   RUST_LOG              - log filter (default: info,hookrelay=debug)

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hookrelay::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // before parsing: clap reads the same variables
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,hookrelay=debug".into()),
        )
        .init();

    cli::run(Cli::parse()).await
}
