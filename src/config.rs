//! Runtime configuration.
//!
//! Connection settings come from the environment (a `.env` file is honoured by
//! the binary through `dotenvy`). Remote identifiers that carry local meaning
//! live in a JSON mappings file so they can change without a rebuild.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::digest::DigestSettings;
use crate::integrations::{asana, slack};
use crate::sync::FieldMappings;
use crate::workflow::WorkflowSettings;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default SQLite file
pub const DEFAULT_DATABASE: &str = "hookrelay.db";

/// Outbound request timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid mappings: {0}")]
    Invalid(String),
}

/// Relay runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind: String,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Optional JSON mappings file
    pub mappings_path: Option<PathBuf>,

    /// Timeout applied to every Asana and Slack call
    pub http_timeout: Duration,

    pub asana_token: String,
    pub asana_workspace: String,
    pub asana_base_url: String,

    pub slack_token: String,

    /// Channel receiving the daily digest
    pub slack_channel: String,
    pub slack_base_url: String,

    /// Public base URI Asana calls back, e.g. `https://relay.example.com`
    pub server_base_uri: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE),
            mappings_path: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            asana_token: String::new(),
            asana_workspace: String::new(),
            asana_base_url: asana::DEFAULT_BASE_URL.to_string(),
            slack_token: String::new(),
            slack_channel: String::new(),
            slack_base_url: slack::DEFAULT_BASE_URL.to_string(),
            server_base_uri: "http://127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("HOOKRELAY_BIND").unwrap_or(defaults.bind),
            database_path: lookup("HOOKRELAY_DATABASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            mappings_path: lookup("HOOKRELAY_MAPPINGS")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            http_timeout: lookup("HOOKRELAY_HTTP_TIMEOUT")
                .and_then(|t| t.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            asana_token: lookup("ASANA_TOKEN").unwrap_or_default(),
            asana_workspace: lookup("ASANA_WORKSPACE").unwrap_or_default(),
            asana_base_url: lookup("ASANA_BASE_URL").unwrap_or(defaults.asana_base_url),
            slack_token: lookup("SLACK_TOKEN").unwrap_or_default(),
            slack_channel: lookup("SLACK_BLOCKS_CHANNEL").unwrap_or_default(),
            slack_base_url: lookup("SLACK_BASE_URL").unwrap_or(defaults.slack_base_url),
            server_base_uri: lookup("SERVER_BASE_URI")
                .map(|uri| uri.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_base_uri),
        }
    }

    /// Read the mappings file, or fall back to built-in defaults
    pub fn load_mappings(&self) -> Result<Mappings, ConfigError> {
        match &self.mappings_path {
            Some(path) => Mappings::load(path),
            None => {
                tracing::warn!("HOOKRELAY_MAPPINGS not set, no custom fields will be mirrored");
                Ok(Mappings::default())
            }
        }
    }
}

/// Remote identifiers with local meaning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Mappings {
    pub custom_fields: FieldMappings,
    pub workflow: WorkflowSettings,
    pub digest: DigestSettings,
}

impl Mappings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mappings: Mappings = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        mappings.custom_fields.validate().map_err(ConfigError::Invalid)?;
        Ok(mappings)
    }
}
