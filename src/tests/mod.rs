//! Shared test harness and end-to-end flows across ingress, dispatch,
//! archiving and listing.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path},
};

use crate::{
    AppState, build_app,
    archiver::APPLICATION_KEY_HEADER,
    config::HookvaultConfig,
    dispatch::{
        Dispatcher, MemoryTaskQueue, QueueDispatcher, TASK_NAME_HEADER, TASK_SIGNATURE_HEADER,
        TaskEntry, TaskQueue, sign_task,
        worker::{InvokeError, TaskInvoker, run_due_tasks},
    },
    integrity::compute_signature,
    routes::ingress::SIGNATURE_HEADER,
    store::{ArchiveStore, MemoryStore},
};

/// An application wired to in-memory store and queue.
pub(crate) struct TestApp {
    config: HookvaultConfig,
    state: AppState,
    queue: Arc<MemoryTaskQueue>,
}

impl TestApp {
    pub(crate) async fn new() -> Self {
        Self::with_config(Self::config()).await
    }

    pub(crate) async fn with_config(config: HookvaultConfig) -> Self {
        let store: Arc<dyn ArchiveStore> = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryTaskQueue::new());
        let dyn_queue: Arc<dyn TaskQueue> = queue.clone();
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(QueueDispatcher::new(dyn_queue.clone()));

        let state = AppState::new(
            config.clone(),
            store,
            dyn_queue,
            dispatcher,
            reqwest::Client::new(),
        );

        Self {
            config,
            state,
            queue,
        }
    }

    pub(crate) fn config() -> HookvaultConfig {
        HookvaultConfig::from_str("[app]\nkey = \"test-key\"\n").unwrap()
    }

    pub(crate) fn router(&self) -> Router {
        build_app(&self.config, self.state.clone())
    }

    pub(crate) fn key(&self) -> &str {
        &self.config.app.key
    }

    pub(crate) fn state(&self) -> &AppState {
        &self.state
    }

    pub(crate) async fn pending_tasks(&self) -> Vec<TaskEntry> {
        self.queue.entries().await
    }

    /// Deliver queued tasks through the router until the queue is idle.
    pub(crate) async fn drain_tasks(&self) {
        let queue: Arc<dyn TaskQueue> = self.queue.clone();
        let invoker: Arc<dyn TaskInvoker> = Arc::new(RouterInvoker {
            router: self.router(),
            key: self.config.app.key.clone(),
        });

        for _ in 0..20 {
            let result = run_due_tasks(&queue, &invoker, &self.config.dispatcher)
                .await
                .unwrap();
            if result.total() == 0 {
                return;
            }
        }
        panic!("task queue did not settle");
    }
}

/// Invokes handlers in-process instead of over the network.
struct RouterInvoker {
    router: Router,
    key: String,
}

#[async_trait]
impl TaskInvoker for RouterInvoker {
    async fn invoke(&self, entry: &TaskEntry) -> Result<(), InvokeError> {
        let name = entry.name();
        let signature = sign_task(self.key.as_bytes(), &name, &entry.payload)
            .map_err(|e| InvokeError::Transport(e.to_string()))?;
        let request = Request::builder()
            .method("POST")
            .uri(entry.kind.handler_path())
            .header(TASK_NAME_HEADER, name)
            .header(TASK_SIGNATURE_HEADER, signature)
            .body(Body::from(entry.payload.clone()))
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| InvokeError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(InvokeError::Status {
                status: status.as_u16(),
                body: String::new(),
            })
        }
    }
}

fn batch_for(href: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!([{
        "event_type": "create",
        "resource": "invoices",
        "created": "2024-01-01T00:00:00Z",
        "data": {"id": 42, "href": href},
    }]))
    .unwrap()
}

async fn post_webhook(app: &TestApp, body: Vec<u8>) -> StatusCode {
    let signature = compute_signature(&body, app.key().as_bytes()).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/r")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .unwrap();
    app.router().oneshot(request).await.unwrap().status()
}

async fn listing(app: &TestApp, uri: &str) -> Value {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_webhook_resource_is_archived_and_listed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/invoices/42"))
        .and(header(APPLICATION_KEY_HEADER, "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"total":99}"#))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = TestApp::new().await;
    let href = format!("{}/invoices/42", upstream.uri());
    assert_eq!(post_webhook(&app, batch_for(&href)).await, StatusCode::OK);

    app.drain_tasks().await;
    assert!(app.pending_tasks().await.is_empty());

    let records = listing(&app, "/l/invoices/42").await;
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["resource"], serde_json::json!({"total": 99}));
    assert_eq!(records[0]["hookdate"], "2024-01-01T00:00:00Z");
    assert_eq!(records[0]["digest"].as_str().unwrap().len(), 64);
}

#[tokio::test]
async fn test_oversized_resource_is_abandoned_end_to_end() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/invoices/42"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b' '; 9 * 1024 * 1024]))
        .mount(&upstream)
        .await;

    let app = TestApp::new().await;
    let href = format!("{}/invoices/42", upstream.uri());
    assert_eq!(post_webhook(&app, batch_for(&href)).await, StatusCode::OK);

    app.drain_tasks().await;
    assert!(app.pending_tasks().await.is_empty());
    assert_eq!(app.state().store.count().await.unwrap(), 0);
    assert_eq!(listing(&app, "/l/invoices/42").await, serde_json::json!([]));
}

#[tokio::test]
async fn test_purge_chain_runs_to_completion() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .uri("/cron/daily")
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.pending_tasks().await.len(), 1);

    app.drain_tasks().await;
    assert!(app.pending_tasks().await.is_empty());
}
