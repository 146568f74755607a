//! Inbound Asana webhooks
//!
//! - `registry`: which subscription a request path belongs to
//! - `signature`: handshake and HMAC verification
//! - `ingest`: the per-request pipeline from raw body to committed rows

pub mod ingest;
pub mod registry;
pub mod signature;

pub use ingest::{Ingested, Pipeline, Route};
pub use registry::{Registration, WebhookRegistry};
pub use signature::{verify, Rejection, Verification, SECRET_HEADER, SIGNATURE_HEADER};

/// Workspace-level project webhook
pub const PROJECTS_PATH: &str = "/asana/projects";

/// Task webhook scoped to one project
pub fn tasks_path(project_external_id: &str) -> String {
    format!("{PROJECTS_PATH}/{project_external_id}")
}

/// Customer workflow webhook scoped to one project
pub fn workflow_path(project_external_id: &str) -> String {
    format!("{PROJECTS_PATH}/{project_external_id}/workflow")
}
