//! Task handler endpoints, invoked only by the dispatch worker.
//!
//! Invocations must carry the task name and a signature keyed by the
//! application key; see [`crate::dispatch::sign_task`].
//!
//! A handler answers 200 when its task is settled, whether completed or
//! abandoned, and 500 when it wants the dispatcher to retry.

use std::fmt::Display;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};

use super::error::ApiError;
use crate::{
    AppState,
    archiver::{self, EventRecord},
    dispatch::{TASK_NAME_HEADER, TASK_SIGNATURE_HEADER, TaskKind, TaskOutcome, verify_task},
};

/// Response header reporting how the handler settled the task.
pub const TASK_OUTCOME_HEADER: &str = "X-Task-Outcome";

pub fn task_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            TaskKind::ProcessHook.handler_path(),
            post(process_hook_task),
        )
        .route(
            TaskKind::SaveResource.handler_path(),
            post(save_resource_task),
        )
        .route(
            TaskKind::PurgeBefore.handler_path(),
            post(purge_before_task),
        )
        .route(TaskKind::PurgeStep.handler_path(), post(purge_step_task))
        .route_layer(middleware::from_fn_with_state(state, require_signed_task))
}

/// Reject requests that did not come from the dispatcher: the task name
/// must be present and the signature must cover it and the payload.
pub async fn require_signed_task(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let headers = {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        (header(TASK_NAME_HEADER), header(TASK_SIGNATURE_HEADER))
    };
    let (Some(name), Some(signature)) = headers
    else {
        tracing::warn!(
            path = %path,
            "Invalid task: missing {} or {} request header",
            TASK_NAME_HEADER,
            TASK_SIGNATURE_HEADER
        );
        return invalid_task();
    };

    let (parts, body) = req.into_parts();
    let payload = match axum::body::to_bytes(body, state.config.server.body_limit_bytes).await {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Invalid task: unreadable body");
            return invalid_task();
        }
    };

    if !verify_task(state.config.app.key.as_bytes(), &name, &payload, &signature) {
        tracing::warn!(path = %path, task = %name, "Invalid task: signature mismatch");
        return invalid_task();
    }

    next.run(Request::from_parts(parts, Body::from(payload))).await
}

fn invalid_task() -> Response {
    ApiError::BadRequest("Bad Request - Invalid Task".into()).into_response()
}

fn outcome_response(outcome: TaskOutcome) -> Response {
    let value = match outcome {
        TaskOutcome::Completed => "completed",
        TaskOutcome::Abandoned { .. } => "abandoned",
    };
    ([(TASK_OUTCOME_HEADER, value)], "OK").into_response()
}

fn task_failure(kind: TaskKind, err: impl Display) -> ApiError {
    ApiError::Internal(format!("{kind} failed: {err}"))
}

async fn process_hook_task(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let outcome = archiver::process_hook(state.dispatcher.as_ref(), &body)
        .await
        .map_err(|e| task_failure(TaskKind::ProcessHook, e))?;
    Ok(outcome_response(outcome))
}

async fn save_resource_task(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let event: EventRecord = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, "Abandoning save-resource: invalid event payload");
            return Ok(outcome_response(TaskOutcome::abandoned(e.to_string())));
        }
    };

    let outcome = state
        .archiver
        .save_resource(&event)
        .await
        .map_err(|e| task_failure(TaskKind::SaveResource, e))?;
    Ok(outcome_response(outcome))
}

async fn purge_before_task(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let outcome = state
        .purger
        .purge_before(&body)
        .await
        .map_err(|e| task_failure(TaskKind::PurgeBefore, e))?;
    Ok(outcome_response(outcome))
}

async fn purge_step_task(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let outcome = state
        .purger
        .purge_step(&body)
        .await
        .map_err(|e| task_failure(TaskKind::PurgeStep, e))?;
    Ok(outcome_response(outcome))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::{
        dispatch::sign_task, store::ArchiveRecord, streaming::pack_bytes, tests::TestApp,
    };

    fn task_request(kind: TaskKind, body: Vec<u8>, signed: bool) -> Request<Body> {
        let name = format!("{kind}-test");
        let mut builder = Request::builder()
            .method("POST")
            .uri(kind.handler_path());
        if signed {
            let signature = sign_task(b"test-key", &name, &body).unwrap();
            builder = builder
                .header(TASK_NAME_HEADER, name)
                .header(TASK_SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_missing_task_name_is_rejected_before_handler() {
        let app = TestApp::new().await;
        let payload = pack_bytes(b"[]").unwrap();

        for kind in TaskKind::ALL {
            let response = app
                .router()
                .oneshot(task_request(kind, payload.clone(), false))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{kind}");
        }
        assert!(app.pending_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_task_name_without_signature_is_rejected() {
        let app = TestApp::new().await;

        for kind in TaskKind::ALL {
            let request = Request::builder()
                .method("POST")
                .uri(kind.handler_path())
                .header(TASK_NAME_HEADER, "anything")
                .body(Body::from(b"{}".to_vec()))
                .unwrap();
            let response = app.router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{kind}");
        }
    }

    #[tokio::test]
    async fn test_unsigned_purge_and_fetch_have_no_effect() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(0)
            .mount(&upstream)
            .await;

        let app = TestApp::new().await;
        let record = ArchiveRecord::new(
            "invoices/1",
            "invoices",
            "h",
            pack_bytes(b"{}").unwrap(),
            "d",
        );
        app.state().store.put(record).await.unwrap();

        let event = serde_json::to_vec(&serde_json::json!({
            "event_type": "create",
            "resource": "invoices",
            "created": "c",
            "data": {"id": 1, "href": format!("{}/steal", upstream.uri())},
        }))
        .unwrap();
        let deadline = serde_json::to_vec("2999-01-01T00:00:00Z").unwrap();

        for (kind, body) in [
            (TaskKind::SaveResource, event),
            (TaskKind::PurgeBefore, deadline),
        ] {
            let name = format!("{kind}-forged");
            let signature = sign_task(b"wrong-key", &name, &body).unwrap();
            let request = Request::builder()
                .method("POST")
                .uri(kind.handler_path())
                .header(TASK_NAME_HEADER, name)
                .header(TASK_SIGNATURE_HEADER, signature)
                .body(Body::from(body))
                .unwrap();
            let response = app.router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{kind}");
        }

        assert_eq!(app.state().store.count().await.unwrap(), 1);
        assert!(app.pending_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_signature_over_other_payload_is_rejected() {
        let app = TestApp::new().await;
        let name = "purge-before-test";
        let signature = sign_task(b"test-key", name, b"\"2000-01-01T00:00:00Z\"").unwrap();
        let request = Request::builder()
            .method("POST")
            .uri(TaskKind::PurgeBefore.handler_path())
            .header(TASK_NAME_HEADER, name)
            .header(TASK_SIGNATURE_HEADER, signature)
            .body(Body::from("\"2999-01-01T00:00:00Z\""))
            .unwrap();

        let response = app.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_process_hook_enqueues_save_resource() {
        let app = TestApp::new().await;
        let batch = br#"[{"event_type":"create","resource":"invoices","created":"c","data":{"id":1,"href":"http://h/1"}}]"#;

        let response = app
            .router()
            .oneshot(task_request(
                TaskKind::ProcessHook,
                pack_bytes(batch).unwrap(),
                true,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[TASK_OUTCOME_HEADER], "completed");
        let tasks = app.pending_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::SaveResource);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_acknowledged_as_abandoned() {
        let app = TestApp::new().await;

        for kind in TaskKind::ALL {
            let response = app
                .router()
                .oneshot(task_request(kind, b"\x00garbage".to_vec(), true))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{kind}");
            assert_eq!(response.headers()[TASK_OUTCOME_HEADER], "abandoned", "{kind}");
        }
    }

    #[tokio::test]
    async fn test_purge_before_completes_on_empty_store() {
        let app = TestApp::new().await;
        let deadline = serde_json::to_vec(&chrono::Utc::now()).unwrap();

        let response = app
            .router()
            .oneshot(task_request(TaskKind::PurgeBefore, deadline, true))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[TASK_OUTCOME_HEADER], "completed");
        assert!(app.pending_tasks().await.is_empty());
    }
}
