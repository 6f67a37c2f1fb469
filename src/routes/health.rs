//! Health check endpoints for probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;
#[cfg(feature = "prometheus")]
use crate::observability::metrics::get_prometheus_handle;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy"
    pub status: &'static str,
    pub version: &'static str,
    pub store: ComponentStatus,
    pub queue: QueueStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub healthy: bool,
    /// Pending tasks, including ones waiting out a backoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u64>,
}

/// Full health check with store and queue status.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let store_result = state.store.health_check().await;
    let latency_ms = start.elapsed().as_millis() as u64;

    let store = ComponentStatus {
        healthy: store_result.is_ok(),
        message: store_result.err().map(|e| e.to_string()),
        latency_ms,
    };

    let depth = state.queue.len().await.ok();
    let queue = QueueStatus {
        healthy: depth.is_some(),
        depth,
    };

    let healthy = store.healthy && queue.healthy;
    let health = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        store,
        queue,
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Liveness probe. Always 200 while the process serves requests.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe. 503 while the archive store is unreachable.
#[tracing::instrument(name = "health.readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.store.health_check().await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// Prometheus metrics endpoint.
#[tracing::instrument(name = "health.metrics")]
pub async fn metrics() -> impl IntoResponse {
    #[cfg(feature = "prometheus")]
    {
        return match get_prometheus_handle() {
            Some(handle) => (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            ),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            ),
        };
    }
    #[cfg(not(feature = "prometheus"))]
    (
        StatusCode::NOT_FOUND,
        [("content-type", "text/plain")],
        "Prometheus metrics not enabled".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{dispatch::TaskKind, tests::TestApp};

    async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_reports_store_and_queue() {
        let app = TestApp::new().await;
        app.state()
            .dispatcher
            .enqueue(TaskKind::PurgeStep, Vec::new())
            .await
            .unwrap();

        let (status, json) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["store"]["healthy"], true);
        assert_eq!(json["queue"]["depth"], 1);
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn test_liveness_and_readiness() {
        let app = TestApp::new().await;
        let (status, _) = get_json(&app, "/health/live").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = get_json(&app, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }
}
