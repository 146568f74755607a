//! External integrations the relay talks to
//!
//! Supports:
//! - Asana: task lookups, subtask replication, task search and webhook management
//! - Slack: posting digest messages to a channel

pub mod asana;
pub mod slack;

pub use asana::{AsanaApi, AsanaClient, AsanaTask, Compact, NewTask, TaskSearch, WebhookSpec};
pub use slack::{SlackApi, SlackClient};

/// Failure talking to a remote API
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} rejected the call: {message}")]
    Api {
        service: &'static str,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Keep error bodies short in logs
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
