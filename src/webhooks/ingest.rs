//! Webhook ingestion pipeline.
//!
//! Per request:
//! 1. RESOLVE  - path (and project) to a registered subscription
//! 2. VERIFY   - handshake or signature, no I/O
//! 3. PARSE    - `{"events": [...]}`; an empty list is a keep-alive
//! 4. DISPATCH - record only, task sync, or workflow propagation
//!
//! Remote reads happen before the unit of work opens. The event row and every
//! local side effect of the batch commit together or not at all.

use std::sync::Arc;

use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::registry::WebhookRegistry;
use super::signature::{verify, Rejection, Verification};
use crate::config::Mappings;
use crate::errors::AppError;
use crate::integrations::AsanaApi;
use crate::jobs::Jobs;
use crate::metrics;
use crate::store::{Event, Store, StoreError, Webhook};
use crate::sync::TaskSynchronizer;
use crate::workflow::WorkflowPropagator;

/// What a verified batch is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Record the batch only
    Projects,
    /// Mirror the referenced tasks
    Tasks,
    /// Replicate workflow template subtasks
    Workflow,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Projects => "projects",
            Route::Tasks => "tasks",
            Route::Workflow => "workflow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// Secret stored; echo it back
    Handshake { secret: String },
    /// Verified empty batch, nothing stored
    KeepAlive,
    Recorded {
        event_id: String,
        tasks_synced: usize,
        jobs_submitted: usize,
    },
}

#[derive(Debug, Deserialize)]
struct EventBatch {
    events: Vec<Value>,
}

pub struct Pipeline {
    store: Store,
    registry: WebhookRegistry,
    synchronizer: TaskSynchronizer,
    propagator: WorkflowPropagator,
    jobs: Jobs,
}

impl Pipeline {
    pub fn new(
        store: Store,
        asana: Arc<dyn AsanaApi>,
        mappings: &Mappings,
        workspace: &str,
        jobs: Jobs,
    ) -> Self {
        Self {
            registry: WebhookRegistry::new(store.clone()),
            synchronizer: TaskSynchronizer::new(
                asana.clone(),
                Arc::new(mappings.custom_fields.clone()),
            ),
            propagator: WorkflowPropagator::new(
                asana,
                mappings.workflow.clone(),
                workspace.to_string(),
            ),
            store,
            jobs,
        }
    }

    pub async fn handle(
        &self,
        route: Route,
        path: &str,
        project: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Ingested, AppError> {
        let result = self.process(route, path, project, headers, body).await;
        let outcome = match &result {
            Ok(Ingested::Handshake { .. }) => "handshake",
            Ok(Ingested::KeepAlive) => "keep_alive",
            Ok(Ingested::Recorded { .. }) => "recorded",
            Err(e) => error_label(e),
        };
        metrics::WEBHOOK_REQUESTS
            .with_label_values(&[route.as_str(), outcome])
            .inc();
        result
    }

    async fn process(
        &self,
        route: Route,
        path: &str,
        project: Option<&str>,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Ingested, AppError> {
        let webhook = self.registry.resolve(path, project)?;

        match verify(&webhook, headers, body) {
            Verification::HandshakeAccepted { secret } => {
                self.confirm(&webhook, &secret)?;
                return Ok(Ingested::Handshake { secret });
            }
            Verification::Rejected { reason, .. } => return Err(reason.into()),
            Verification::SignatureValid => {}
        }

        let batch: EventBatch = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidRequest(format!("Malformed event payload: {e}")))?;
        if batch.events.is_empty() {
            debug!(path, "keep-alive batch");
            return Ok(Ingested::KeepAlive);
        }

        let (event, tasks_synced, jobs_submitted) = match route {
            Route::Projects => {
                let event = self.record(&webhook, &batch.events)?;
                (event, 0, 0)
            }
            Route::Tasks => {
                let ids = TaskSynchronizer::task_ids(&batch.events)?;
                let remote = self.synchronizer.fetch(&ids).await?;
                let (synced, event) = self.store.unit_of_work(|uow| {
                    let synced = self.synchronizer.persist(uow, &remote)?;
                    let event = uow.record_event(&webhook, &batch.events)?;
                    Ok::<_, AppError>((synced, event))
                })?;
                metrics::TASKS_SYNCED.inc_by(synced.len() as u64);
                (event, synced.len(), 0)
            }
            Route::Workflow => {
                let planned = self.propagator.plan(&batch.events).await?;
                let event = self.record(&webhook, &batch.events)?;
                let handles = self.propagator.spawn(&self.jobs, planned);
                (event, 0, handles.len())
            }
        };

        metrics::EVENTS_RECORDED.inc();
        let event_id = event.map(|event| event.id).unwrap_or_default();
        info!(
            path,
            route = route.as_str(),
            event = %event_id,
            events = batch.events.len(),
            tasks_synced,
            jobs_submitted,
            "webhook batch recorded"
        );
        Ok(Ingested::Recorded {
            event_id,
            tasks_synced,
            jobs_submitted,
        })
    }

    fn confirm(&self, webhook: &Webhook, secret: &str) -> Result<(), AppError> {
        self.store
            .unit_of_work(|uow| uow.confirm_webhook(&webhook.id, secret))
            .map_err(|e| match e {
                // lost a race with a concurrent handshake
                StoreError::SecretAlreadySet => Rejection::SecretAlreadySet.into(),
                other => AppError::from(other),
            })?;
        info!(path = %webhook.path, "webhook handshake completed");
        Ok(())
    }

    fn record(&self, webhook: &Webhook, events: &[Value]) -> Result<Option<Event>, AppError> {
        Ok(self
            .store
            .unit_of_work(|uow| uow.record_event(webhook, events))?)
    }
}

fn error_label(error: &AppError) -> &'static str {
    match error {
        AppError::NotFound(_) => "not_found",
        AppError::Mismatch(_) => "mismatch",
        AppError::InvalidRequest(_) => "invalid",
        AppError::SecurityViolation(_) => "rejected",
        AppError::Misconfiguration(_) => "misconfigured",
        AppError::Upstream(_) => "upstream_error",
        AppError::Store(StoreError::SecretAlreadySet) => "rejected",
        AppError::Store(_) => "store_error",
    }
}
