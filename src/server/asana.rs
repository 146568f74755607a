//! Asana webhook endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use super::SharedState;
use crate::errors::AppError;
use crate::webhooks::{self, Ingested, Route, SECRET_HEADER};

/// `POST /asana/projects`
pub async fn projects_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let ingested = state
        .pipeline
        .handle(Route::Projects, webhooks::PROJECTS_PATH, None, &headers, &body)
        .await?;
    Ok(respond(ingested))
}

/// `POST /asana/projects/{project_id}`
pub async fn tasks_webhook(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path = webhooks::tasks_path(&project_id);
    let ingested = state
        .pipeline
        .handle(Route::Tasks, &path, Some(&project_id), &headers, &body)
        .await?;
    Ok(respond(ingested))
}

/// `POST /asana/projects/{project_id}/workflow`
pub async fn workflow_webhook(
    State(state): State<SharedState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let path = webhooks::workflow_path(&project_id);
    let ingested = state
        .pipeline
        .handle(Route::Workflow, &path, Some(&project_id), &headers, &body)
        .await?;
    Ok(respond(ingested))
}

fn respond(ingested: Ingested) -> Response {
    match ingested {
        Ingested::Handshake { secret } => {
            (StatusCode::NO_CONTENT, [(SECRET_HEADER, secret)]).into_response()
        }
        Ingested::KeepAlive | Ingested::Recorded { .. } => StatusCode::NO_CONTENT.into_response(),
    }
}
