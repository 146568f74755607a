//! Slack slash commands. Both reply in channel with markdown section blocks.

use axum::{
    extract::{rejection::FormRejection, State},
    Form, Json,
};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::SharedState;
use crate::errors::AppError;
use crate::store::Ritual;

#[derive(Debug, Deserialize)]
pub struct RitualCommand {
    pub command: String,
    /// Ritual name
    pub text: String,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
pub struct HumansCommand {
    #[serde(default)]
    pub command: Option<String>,
    /// Whitespace separated names
    pub text: String,
}

/// `POST /slack/commands/ritual`
pub async fn start_ritual(
    State(state): State<SharedState>,
    form: Result<Form<RitualCommand>, FormRejection>,
) -> Result<Json<Value>, AppError> {
    let Form(command) = form.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let name = command.text.trim();
    let ritual = state
        .store
        .unit_of_work(|uow| uow.ritual_by_name(name))?
        .ok_or_else(|| AppError::NotFound(format!("No ritual called {name:?}")))?;
    debug!(ritual = %ritual.name, user = %command.user_name, "ritual started");
    Ok(Json(in_channel(ritual_blocks(&command.user_name, &ritual))))
}

/// `POST /slack/commands/random_humans`
pub async fn random_humans(
    form: Result<Form<HumansCommand>, FormRejection>,
) -> Result<Json<Value>, AppError> {
    let Form(command) = form.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let mut humans: Vec<&str> = command.text.split_whitespace().collect();
    humans.shuffle(&mut rand::thread_rng());
    Ok(Json(in_channel(humans_blocks(&humans))))
}

fn ritual_blocks(user_name: &str, ritual: &Ritual) -> Vec<Value> {
    let mut blocks = vec![section(&format!(
        "{user_name} started the Ritual {}",
        ritual.name
    ))];
    if let Some(url) = ritual.meeting_url.as_deref().filter(|u| !u.is_empty()) {
        blocks.push(section(&format!("Join the conversation here: <{url}>")));
    }
    if let Some(url) = ritual.logs_url.as_deref().filter(|u| !u.is_empty()) {
        blocks.push(section(&format!("Read the logs here: <{url}>")));
    }
    blocks
}

fn humans_blocks(humans: &[&str]) -> Vec<Value> {
    let mut blocks = vec![section("Putting the humans in order...")];
    if humans.is_empty() {
        blocks.push(section("No humans left. Only robots now!"));
    }
    for (position, human) in humans.iter().enumerate() {
        blocks.push(section(&format!("{}: \t{human}", position + 1)));
    }
    blocks
}

fn section(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

fn in_channel(blocks: Vec<Value>) -> Value {
    json!({ "response_type": "in_channel", "blocks": blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(blocks: &[Value]) -> Vec<&str> {
        blocks
            .iter()
            .map(|block| block["text"]["text"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_ritual_blocks() {
        let mut ritual = Ritual {
            id: "r".into(),
            name: "retro".into(),
            team_id: None,
            logs_url: Some("https://logs.example.com".into()),
            meeting_url: None,
        };
        assert_eq!(
            texts(&ritual_blocks("ada", &ritual)),
            vec![
                "ada started the Ritual retro",
                "Read the logs here: <https://logs.example.com>"
            ]
        );

        ritual.meeting_url = Some("https://meet.example.com/x".into());
        let blocks = ritual_blocks("ada", &ritual);
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            texts(&blocks)[1],
            "Join the conversation here: <https://meet.example.com/x>"
        );
    }

    #[test]
    fn test_humans_blocks() {
        let blocks = humans_blocks(&["there", "was", "upon", "a", "time"]);
        assert_eq!(blocks.len(), 6);
        assert_eq!(texts(&blocks)[1], "1: \tthere");
        assert_eq!(blocks[0]["type"], "section");
        assert_eq!(blocks[0]["text"]["type"], "mrkdwn");

        let empty = humans_blocks(&[]);
        assert_eq!(texts(&empty), vec![
            "Putting the humans in order...",
            "No humans left. Only robots now!"
        ]);
    }
}
