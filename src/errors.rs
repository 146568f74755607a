//! Error taxonomy shared by the webhook pipeline, the chat commands and the CLI.
//!
//! Every variant maps to one HTTP status at the request boundary. Security
//! rejections carry a reason for the logs only; the response body is generic.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::integrations::ClientError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Unregistered webhook, project or named entity
    #[error("{0}")]
    NotFound(String),

    /// Registration and request path disagree
    #[error("{0}")]
    Mismatch(String),

    /// Missing headers or fields, malformed event payload
    #[error("{0}")]
    InvalidRequest(String),

    /// Duplicate secret write or signature mismatch
    #[error("security violation: {0}")]
    SecurityViolation(String),

    /// The server is not in a state to verify the request
    #[error("{0}")]
    Misconfiguration(String),

    /// The task or chat API failed while serving the request
    #[error("upstream: {0}")]
    Upstream(#[from] ClientError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Mismatch(_) | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SecurityViolation(_) => StatusCode::BAD_REQUEST,
            AppError::Misconfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(StoreError::SecretAlreadySet) => StatusCode::BAD_REQUEST,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the caller
    fn public_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Mismatch(msg)
            | AppError::InvalidRequest(msg)
            | AppError::Misconfiguration(msg) => msg.clone(),
            AppError::SecurityViolation(_) | AppError::Store(StoreError::SecretAlreadySet) => {
                "Request rejected".to_string()
            }
            AppError::Upstream(_) => "Upstream service unavailable".to_string(),
            AppError::Store(_) => "Internal error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::SecurityViolation(reason) => {
                tracing::warn!(reason = %reason, "HACKING ATTEMPT: request rejected");
            }
            AppError::Upstream(e) => tracing::error!(error = %e, "upstream call failed"),
            AppError::Store(e) => tracing::error!(error = %e, "store failure"),
            AppError::Misconfiguration(msg) => tracing::error!(%msg, "misconfigured webhook"),
            _ => tracing::debug!(status = %status, error = %self, "request rejected"),
        }
        (status, Json(json!({ "msg": self.public_message() }))).into_response()
    }
}
