//! hookrelay - relay between Asana webhooks, Slack and a local mirror
//!
//! - `webhooks`: handshake, signature check and the ingestion pipeline
//! - `sync`: mirrors Asana tasks into local rows with a change history
//! - `workflow`: replicates template subtasks into customer projects
//! - `digest`: daily per-person task summary posted to Slack
//! - `server` / `cli`: the HTTP surface and the operator commands

pub mod cli;
pub mod config;
pub mod digest;
pub mod errors;
pub mod integrations;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod store;
pub mod sync;
pub mod webhooks;
pub mod workflow;

pub use config::{Config, Mappings};
pub use errors::AppError;
pub use store::Store;
