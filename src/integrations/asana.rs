//! Asana REST client.
//!
//! [`AsanaApi`] is the seam the webhook pipeline depends on; [`AsanaClient`]
//! implements it over `reqwest` and adds the read-only calls the operator CLI
//! prints verbatim.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{truncate_body, ClientError};

pub const DEFAULT_BASE_URL: &str = "https://app.asana.com/api/1.0";

const PAGE_LIMIT: u32 = 100;

/// Minimal `{gid, name, resource_type}` reference returned by most endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compact {
    pub gid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
}

impl Compact {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Membership {
    #[serde(default)]
    pub project: Option<Compact>,
    #[serde(default)]
    pub section: Option<Compact>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnumOption {
    pub gid: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomField {
    pub gid: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Deprecated upstream but still sent next to `resource_subtype`
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub resource_subtype: Option<String>,
    #[serde(default)]
    pub enum_value: Option<EnumOption>,
    #[serde(default)]
    pub enum_options: Vec<EnumOption>,
}

impl CustomField {
    pub fn is_enum(&self) -> bool {
        self.field_type.as_deref() == Some("enum")
            || self.resource_subtype.as_deref() == Some("enum")
    }
}

/// Full task record as returned by `GET /tasks/{gid}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AsanaTask {
    pub gid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "notes", alias = "description")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub memberships: Vec<Membership>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomFieldSetting {
    pub custom_field: CustomField,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsanaProject {
    pub gid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub custom_field_settings: Vec<CustomFieldSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMembership {
    pub project: String,
    pub section: String,
}

/// Payload for `POST /tasks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub name: String,
    pub notes: String,
    pub projects: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub memberships: Vec<NewMembership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Filters for the workspace task search
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskSearch {
    pub assignee: String,
    pub projects: Vec<String>,
    pub completed: bool,
    pub is_subtask: bool,
    /// `(custom field gid, enum option gid)` the task must carry
    pub custom_field_value: Option<(String, String)>,
}

impl TaskSearch {
    fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("assignee.any".to_string(), self.assignee.clone()),
            ("completed".to_string(), self.completed.to_string()),
            ("is_subtask".to_string(), self.is_subtask.to_string()),
        ];
        if !self.projects.is_empty() {
            query.push(("projects.any".to_string(), self.projects.join(",")));
        }
        if let Some((field, value)) = &self.custom_field_value {
            query.push((format!("custom_fields.{field}.value"), value.clone()));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookFilter {
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Payload for `POST /webhooks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookSpec {
    pub resource: String,
    pub target: String,
    pub filters: Vec<WebhookFilter>,
}

#[async_trait]
pub trait AsanaApi: Send + Sync {
    async fn task(&self, gid: &str) -> Result<AsanaTask, ClientError>;

    async fn section_tasks(&self, section_gid: &str) -> Result<Vec<Compact>, ClientError>;

    async fn subtasks(&self, task_gid: &str) -> Result<Vec<Compact>, ClientError>;

    async fn create_task(&self, task: &NewTask) -> Result<Compact, ClientError>;

    async fn search_tasks(
        &self,
        workspace: &str,
        search: &TaskSearch,
    ) -> Result<Vec<Compact>, ClientError>;

    async fn create_webhook(&self, spec: &WebhookSpec) -> Result<Compact, ClientError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct Page {
    data: Vec<Value>,
    #[serde(default)]
    next_page: Option<NextPage>,
}

#[derive(Deserialize)]
struct NextPage {
    offset: String,
}

#[derive(Clone)]
pub struct AsanaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl AsanaClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ClientError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                service: "asana",
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// `GET` a single resource and unwrap its `data` envelope
    pub async fn get_json(&self, path: &str) -> Result<Value, ClientError> {
        debug!(path, "asana GET");
        let value = self.send(self.http.get(self.url(path))).await?;
        unwrap_data(value)
    }

    /// `GET` every page of a collection
    pub async fn get_collection(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<Value>, ClientError> {
        let mut items = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(self.url(path))
                .query(query)
                .query(&[("limit", PAGE_LIMIT.to_string())]);
            if let Some(offset) = &offset {
                request = request.query(&[("offset", offset)]);
            }
            debug!(path, offset = offset.as_deref().unwrap_or(""), "asana GET page");
            let page: Page = serde_json::from_value(self.send(request).await?)
                .map_err(|e| ClientError::Decode(e.to_string()))?;
            items.extend(page.data);
            match page.next_page {
                Some(next) => offset = Some(next.offset),
                None => break,
            }
        }
        Ok(items)
    }

    async fn post_data<T: Serialize + Sync>(&self, path: &str, data: &T) -> Result<Value, ClientError> {
        debug!(path, "asana POST");
        let value = self
            .send(self.http.post(self.url(path)).json(&json!({ "data": data })))
            .await?;
        unwrap_data(value)
    }

    async fn compact_collection(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<Compact>, ClientError> {
        self.get_collection(path, query)
            .await?
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| ClientError::Decode(e.to_string())))
            .collect()
    }

    pub async fn workspaces(&self) -> Result<Vec<Value>, ClientError> {
        self.get_collection("/workspaces", &[]).await
    }

    pub async fn webhooks(&self, workspace: &str) -> Result<Vec<Value>, ClientError> {
        self.get_collection("/webhooks", &[("workspace".to_string(), workspace.to_string())])
            .await
    }

    pub async fn projects(&self, workspace: &str) -> Result<Vec<Compact>, ClientError> {
        self.compact_collection("/projects", &[("workspace".to_string(), workspace.to_string())])
            .await
    }

    pub async fn project(&self, gid: &str) -> Result<AsanaProject, ClientError> {
        let value = self.get_json(&format!("/projects/{gid}")).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn delete_webhook(&self, gid: &str) -> Result<Value, ClientError> {
        debug!(gid, "asana DELETE webhook");
        self.send(self.http.delete(self.url(&format!("/webhooks/{gid}"))))
            .await
    }
}

fn unwrap_data(value: Value) -> Result<Value, ClientError> {
    match value {
        Value::Null => Ok(Value::Null),
        other => serde_json::from_value::<Envelope<Value>>(other)
            .map(|envelope| envelope.data)
            .map_err(|e| ClientError::Decode(e.to_string())),
    }
}

#[async_trait]
impl AsanaApi for AsanaClient {
    async fn task(&self, gid: &str) -> Result<AsanaTask, ClientError> {
        let value = self.get_json(&format!("/tasks/{gid}")).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn section_tasks(&self, section_gid: &str) -> Result<Vec<Compact>, ClientError> {
        self.compact_collection(&format!("/sections/{section_gid}/tasks"), &[])
            .await
    }

    async fn subtasks(&self, task_gid: &str) -> Result<Vec<Compact>, ClientError> {
        self.compact_collection(&format!("/tasks/{task_gid}/subtasks"), &[])
            .await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Compact, ClientError> {
        let value = self.post_data("/tasks", task).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn search_tasks(
        &self,
        workspace: &str,
        search: &TaskSearch,
    ) -> Result<Vec<Compact>, ClientError> {
        // the search endpoint does not paginate
        let request = self
            .http
            .get(self.url(&format!("/workspaces/{workspace}/tasks/search")))
            .query(&search.query());
        let value = unwrap_data(self.send(request).await?)?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn create_webhook(&self, spec: &WebhookSpec) -> Result<Compact, ClientError> {
        let value = self.post_data("/webhooks", spec).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserializes_notes_as_description() {
        let task: AsanaTask = serde_json::from_value(json!({
            "gid": "1201046407912294",
            "name": "Fix the pipes",
            "notes": "leaking again",
            "completed": true,
            "completed_at": "2021-09-28T18:39:13.594Z",
            "memberships": [
                {"project": {"gid": "1", "name": "Tech Workflow"}, "section": {"gid": "2", "name": "Doing"}}
            ],
            "custom_fields": [
                {"gid": "10", "type": "enum", "enum_value": {"gid": "11", "name": "Expedite"}},
                {"gid": "12", "type": "text", "enum_value": null}
            ]
        }))
        .unwrap();
        assert_eq!(task.description.as_deref(), Some("leaking again"));
        assert_eq!(task.memberships[0].section.as_ref().unwrap().name(), "Doing");
        assert!(task.custom_fields[0].is_enum());
        assert!(!task.custom_fields[1].is_enum());
    }

    #[test]
    fn test_custom_field_with_type_and_resource_subtype() {
        let task: AsanaTask = serde_json::from_value(json!({
            "gid": "1201046407912294",
            "name": "Fix the pipes",
            "custom_fields": [
                {
                    "gid": "1200760323623705",
                    "name": "Class of Service",
                    "resource_type": "custom_field",
                    "type": "enum",
                    "resource_subtype": "enum",
                    "enum_value": {"gid": "1200760323624685", "name": "Expedite", "color": "red"},
                    "display_value": "Expedite"
                },
                {"gid": "20", "resource_subtype": "enum", "enum_value": null},
                {"gid": "30", "type": "number", "resource_subtype": "number", "number_value": 3}
            ]
        }))
        .unwrap();
        let fields = &task.custom_fields;
        assert!(fields[0].is_enum());
        assert_eq!(fields[0].enum_value.as_ref().unwrap().name, "Expedite");
        assert!(fields[1].is_enum());
        assert!(!fields[2].is_enum());
    }

    #[test]
    fn test_task_tolerates_missing_optional_keys() {
        let task: AsanaTask = serde_json::from_value(json!({"gid": "1"})).unwrap();
        assert_eq!(task.name, "");
        assert!(task.memberships.is_empty());
        assert!(!task.completed);
    }

    #[test]
    fn test_search_query_parameters() {
        let search = TaskSearch {
            assignee: "42".into(),
            projects: vec!["1".into(), "2".into()],
            completed: false,
            is_subtask: false,
            custom_field_value: Some(("1200200605652836".into(), "1200200605652838".into())),
        };
        let query = search.query();
        assert!(query.contains(&("projects.any".to_string(), "1,2".to_string())));
        assert!(query.contains(&(
            "custom_fields.1200200605652836.value".to_string(),
            "1200200605652838".to_string()
        )));
        assert!(query.contains(&("completed".to_string(), "false".to_string())));
    }

    #[test]
    fn test_new_task_omits_empty_memberships() {
        let task = NewTask {
            name: "Kickoff".into(),
            notes: "copied".into(),
            projects: vec!["9".into()],
            memberships: vec![],
            workspace: None,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("memberships").is_none());
        assert!(value.get("workspace").is_none());
    }

    #[test]
    fn test_unwrap_data_envelope() {
        assert_eq!(unwrap_data(json!({"data": {"gid": "1"}})).unwrap(), json!({"gid": "1"}));
        assert!(unwrap_data(json!({"errors": []})).is_err());
    }
}
