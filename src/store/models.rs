//! Row types for the local mirror.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of remote entity a webhook subscription is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    CustomField,
    EnumOption,
    Project,
    Story,
    Task,
    Webhook,
    Workspace,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::CustomField => "custom_field",
            ResourceType::EnumOption => "enum_option",
            ResourceType::Project => "project",
            ResourceType::Story => "story",
            ResourceType::Task => "task",
            ResourceType::Webhook => "webhook",
            ResourceType::Workspace => "workspace",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "custom_field" => Ok(ResourceType::CustomField),
            "enum_option" => Ok(ResourceType::EnumOption),
            "project" => Ok(ResourceType::Project),
            "story" => Ok(ResourceType::Story),
            "task" => Ok(ResourceType::Task),
            "webhook" => Ok(ResourceType::Webhook),
            "workspace" => Ok(ResourceType::Workspace),
            other => Err(format!("unknown resource type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Webhook {
    pub id: String,
    pub external_id: Option<String>,
    pub path: String,
    pub resource_type: ResourceType,
    pub secret: Option<String>,
    pub project_id: Option<String>,
}

impl Webhook {
    /// A webhook is confirmed once the handshake stored a non-empty secret
    pub fn is_confirmed(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub webhook_id: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns of a task that take part in change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskField {
    Name,
    Description,
    Completed,
    CompletedAt,
    ClassOfService,
    TaskProgress,
    ItemCategory,
    RelatedService,
    Section,
}

impl TaskField {
    pub const ALL: [TaskField; 9] = [
        TaskField::Name,
        TaskField::Description,
        TaskField::Completed,
        TaskField::CompletedAt,
        TaskField::ClassOfService,
        TaskField::TaskProgress,
        TaskField::ItemCategory,
        TaskField::RelatedService,
        TaskField::Section,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskField::Name => "name",
            TaskField::Description => "description",
            TaskField::Completed => "completed",
            TaskField::CompletedAt => "completed_at",
            TaskField::ClassOfService => "class_of_service",
            TaskField::TaskProgress => "task_progress",
            TaskField::ItemCategory => "item_category",
            TaskField::RelatedService => "related_service",
            TaskField::Section => "section",
        }
    }

    /// Whether the column is filled from custom-field values
    pub fn is_classification(&self) -> bool {
        matches!(
            self,
            TaskField::ClassOfService
                | TaskField::TaskProgress
                | TaskField::ItemCategory
                | TaskField::RelatedService
                | TaskField::Section
        )
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Task {
    /// Empty until the row is first saved
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub class_of_service: Option<String>,
    pub task_progress: Option<String>,
    pub item_category: Option<String>,
    pub related_service: Option<String>,
    pub section: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Unsaved shell bound to a remote task id
    pub fn shell(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Default::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_empty()
    }

    pub fn value(&self, field: TaskField) -> Value {
        fn opt(v: &Option<String>) -> Value {
            v.as_ref().map(|s| Value::String(s.clone())).unwrap_or(Value::Null)
        }
        match field {
            TaskField::Name => Value::String(self.name.clone()),
            TaskField::Description => opt(&self.description),
            TaskField::Completed => Value::Bool(self.completed),
            TaskField::CompletedAt => self
                .completed_at
                .map(|t| Value::String(t.to_rfc3339()))
                .unwrap_or(Value::Null),
            TaskField::ClassOfService => opt(&self.class_of_service),
            TaskField::TaskProgress => opt(&self.task_progress),
            TaskField::ItemCategory => opt(&self.item_category),
            TaskField::RelatedService => opt(&self.related_service),
            TaskField::Section => opt(&self.section),
        }
    }

    /// Set a classification column. Returns false for direct fields.
    pub fn set_classification(&mut self, field: TaskField, value: Option<String>) -> bool {
        let slot = match field {
            TaskField::ClassOfService => &mut self.class_of_service,
            TaskField::TaskProgress => &mut self.task_progress,
            TaskField::ItemCategory => &mut self.item_category,
            TaskField::RelatedService => &mut self.related_service,
            TaskField::Section => &mut self.section,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot(
            TaskField::ALL
                .iter()
                .map(|field| (*field, self.value(*field)))
                .collect(),
        )
    }
}

/// Column values of a task at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot(BTreeMap<TaskField, Value>);

impl TaskSnapshot {
    /// Fields whose value in `after` differs from `self`, with the new value
    pub fn changes_to(&self, after: &TaskSnapshot) -> BTreeMap<TaskField, Value> {
        after
            .0
            .iter()
            .filter(|(field, value)| self.0.get(field) != Some(value))
            .map(|(field, value)| (*field, value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskChange {
    pub id: String,
    pub task_id: String,
    pub changes: BTreeMap<TaskField, Value>,
    pub created_at: DateTime<Utc>,
}

impl TaskChange {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: String,
    pub name: String,
}

/// One person, linked across the task, code-hosting and chat platforms
#[derive(Debug, Clone, PartialEq)]
pub struct Tessera {
    pub id: String,
    pub name: String,
    pub asana_id: String,
    pub github_handle: String,
    pub slack_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ritual {
    pub id: String,
    pub name: String,
    pub team_id: Option<String>,
    pub logs_url: Option<String>,
    pub meeting_url: Option<String>,
}
