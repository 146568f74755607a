//! Request correlation and HTTP metrics.
//!
//! - `X-Request-ID` is accepted from the caller or generated, echoed on the
//!   response and attached to the request span
//! - latency and counts are recorded per normalized route so remote gids in
//!   webhook paths do not explode label cardinality

use std::time::Instant;

use axum::{
    extract::Request,
    http::header::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::metrics;

/// Correlation id stored in request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 64;

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN)
        .map(|s| RequestId(s.to_string()))
        .unwrap_or_else(RequestId::generate);

    req.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(start.elapsed().as_secs_f64());
    metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// `/asana/projects/1201046407912294/workflow` -> `/asana/projects/{id}/workflow`
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| if is_gid(segment) { "{id}" } else { segment })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Remote gids are numeric. UUIDs show up when callers use local ids.
fn is_gid(segment: &str) -> bool {
    let numeric = segment.chars().all(|c| c.is_ascii_digit());
    let uuid_like = segment.len() == 36 && segment.matches('-').count() == 4;
    numeric || uuid_like
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/asana/projects/1201046407912294/workflow"),
            "/asana/projects/{id}/workflow"
        );
        assert_eq!(normalize_path("/asana/projects"), "/asana/projects");
        assert_eq!(
            normalize_path("/slack/commands/random_humans"),
            "/slack/commands/random_humans"
        );
        assert_eq!(
            normalize_path("/asana/projects/550e8400-e29b-41d4-a716-446655440000"),
            "/asana/projects/{id}"
        );
        assert_eq!(normalize_path("/"), "/");
    }
}
