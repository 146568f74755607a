//! HTTP surface: Asana webhooks, Slack slash commands, health and metrics.

mod asana;
mod health;
mod slack;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    http::{Method, StatusCode},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::config::{Config, Mappings};
use crate::integrations::{AsanaApi, AsanaClient};
use crate::jobs::Jobs;
use crate::middleware::{request_id, track_metrics};
use crate::store::Store;
use crate::webhooks::Pipeline;

/// Whole-request budget, above the outbound client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

pub struct AppState {
    pub store: Store,
    pub pipeline: Pipeline,
    pub jobs: Jobs,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Store, asana: Arc<dyn AsanaApi>, mappings: &Mappings, config: &Config) -> Self {
        let jobs = Jobs::new();
        Self {
            pipeline: Pipeline::new(
                store.clone(),
                asana,
                mappings,
                &config.asana_workspace,
                jobs.clone(),
            ),
            store,
            jobs,
        }
    }
}

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::ping))
        .route("/metrics", get(health::metrics))
        .route("/asana/projects", post(asana::projects_webhook))
        .route("/asana/projects/{project_id}", post(asana::tasks_webhook))
        .route(
            "/asana/projects/{project_id}/workflow",
            post(asana::workflow_webhook),
        )
        .route("/slack/commands/ritual", post(slack::start_ritual))
        .route("/slack/commands/random_humans", post(slack::random_humans))
        // innermost first: each Router::layer wraps the previous ones
        .layer(middleware::from_fn(track_metrics))
        .layer(middleware::from_fn(request_id))
        .layer(timeout_layer(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Requests over budget are answered with 408
fn timeout_layer(budget: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, budget)
}

/// Run the HTTP server until ctrl-c
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let mappings = config.load_mappings().context("loading mappings")?;
    let store = Store::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let asana = Arc::new(AsanaClient::new(
        config.asana_base_url.clone(),
        config.asana_token.clone(),
        config.http_timeout,
    ));

    let state = Arc::new(AppState::new(store, asana, &mappings, &config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(
        bind = %config.bind,
        database = %config.database_path.display(),
        mapped_fields = mappings.custom_fields.len(),
        "hookrelay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("server error")
}
