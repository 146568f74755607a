//! Shared fixtures for the HTTP integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};

use hookrelay::config::{Config, Mappings};
use hookrelay::integrations::{
    AsanaApi, AsanaTask, ClientError, Compact, NewTask, TaskSearch, WebhookSpec,
};
use hookrelay::server::{build_router, AppState, SharedState};
use hookrelay::store::{ResourceType, Store, StoreError, Webhook};
use hookrelay::webhooks::{tasks_path, workflow_path, PROJECTS_PATH};

pub const PROJECT: &str = "1200";

/// In-memory Asana: tasks by gid, template section and subtasks for the
/// workflow route, and a log of created tasks
#[derive(Default)]
pub struct FakeAsana {
    pub tasks: Mutex<HashMap<String, Value>>,
    pub section_tasks: Mutex<Vec<Compact>>,
    pub subtasks: Mutex<HashMap<String, Vec<Compact>>>,
    pub created: Mutex<Vec<NewTask>>,
    pub task_calls: Mutex<usize>,
}

impl FakeAsana {
    pub fn with_task(self, task: Value) -> Self {
        let gid = task["gid"].as_str().unwrap().to_string();
        self.tasks.lock().insert(gid, task);
        self
    }
}

fn compact(gid: &str, name: &str) -> Compact {
    Compact {
        gid: gid.to_string(),
        name: Some(name.to_string()),
        resource_type: Some("task".to_string()),
    }
}

#[async_trait]
impl AsanaApi for FakeAsana {
    async fn task(&self, gid: &str) -> Result<AsanaTask, ClientError> {
        *self.task_calls.lock() += 1;
        let value = self
            .tasks
            .lock()
            .get(gid)
            .cloned()
            .ok_or_else(|| ClientError::Status {
                service: "asana",
                status: 404,
                body: format!("task {gid} not found"),
            })?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn section_tasks(&self, _section_gid: &str) -> Result<Vec<Compact>, ClientError> {
        Ok(self.section_tasks.lock().clone())
    }

    async fn subtasks(&self, task_gid: &str) -> Result<Vec<Compact>, ClientError> {
        Ok(self
            .subtasks
            .lock()
            .get(task_gid)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_task(&self, task: &NewTask) -> Result<Compact, ClientError> {
        let mut created = self.created.lock();
        created.push(task.clone());
        Ok(compact(&format!("created-{}", created.len()), &task.name))
    }

    async fn search_tasks(
        &self,
        _workspace: &str,
        _search: &TaskSearch,
    ) -> Result<Vec<Compact>, ClientError> {
        Ok(Vec::new())
    }

    async fn create_webhook(&self, spec: &WebhookSpec) -> Result<Compact, ClientError> {
        Ok(compact(&format!("wh-{}", spec.resource), "webhook"))
    }
}

/// Everything a test needs to drive the router and inspect the store
pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub store: Store,
    pub asana: Arc<FakeAsana>,
}

/// Store seeded with project `1200` and the three webhook subscriptions,
/// none of them confirmed yet
pub fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store
        .unit_of_work(|uow| {
            let now = Utc::now();
            let project = uow.insert_project(PROJECT, "Tech Workflow", now, now)?;
            uow.insert_webhook(PROJECTS_PATH, ResourceType::Project, None)?;
            uow.insert_webhook(&tasks_path(PROJECT), ResourceType::Task, Some(project.id.as_str()))?;
            uow.insert_webhook(
                &workflow_path(PROJECT),
                ResourceType::Story,
                Some(project.id.as_str()),
            )?;
            Ok::<_, StoreError>(())
        })
        .unwrap();
    store
}

pub fn build_app(asana: FakeAsana) -> TestApp {
    build_app_with(seeded_store(), asana)
}

pub fn build_app_with(store: Store, asana: FakeAsana) -> TestApp {
    let asana = Arc::new(asana);
    let config = Config {
        asana_workspace: "1100".to_string(),
        ..Config::default()
    };
    let state = Arc::new(AppState::new(
        store.clone(),
        asana.clone(),
        &Mappings::default(),
        &config,
    ));
    TestApp {
        router: build_router(state.clone()),
        state,
        store,
        asana,
    }
}

impl TestApp {
    pub fn webhook(&self, path: &str) -> Webhook {
        self.store
            .unit_of_work(|uow| uow.webhook_by_path(path))
            .unwrap()
            .unwrap()
    }

    pub fn confirm(&self, path: &str, secret: &str) {
        let webhook = self.webhook(path);
        self.store
            .unit_of_work(|uow| uow.confirm_webhook(&webhook.id, secret))
            .unwrap();
    }

    pub fn event_count(&self) -> u64 {
        self.store.unit_of_work(|uow| uow.count_events()).unwrap()
    }

    pub fn task_count(&self) -> u64 {
        self.store.unit_of_work(|uow| uow.count_tasks()).unwrap()
    }
}

pub fn post(uri: &str, headers: &[(&str, &str)], body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(body.into()).unwrap()
}

pub fn post_form(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    if bytes.is_empty() {
        return json!(null);
    }
    serde_json::from_slice(&bytes).unwrap()
}
