//! Read-only archive listing.
//!
//! Responses are streamed as one JSON array, newest record first, and stop
//! after the record that brings the output to the configured byte limit.

use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{Method, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::{AllowHeaders, Any, CorsLayer};

use super::error::ApiError;
use crate::{
    AppState,
    store::{ArchiveRecord, ArchiveStore, ListPage, RecordFilter, StoreCursor},
    streaming::{CountingWriter, unpack_to},
};

/// Records fetched from the store per round trip.
const LISTING_PAGE_SIZE: usize = 25;

const FETCH_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/l/{resource_type}", get(list_by_type))
        .route("/l/{resource_type}/{id}", get(list_by_uri))
        .layer(cors_layer())
}

/// Browsers read the listing cross-origin.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS, Method::HEAD])
        .allow_headers(AllowHeaders::mirror_request())
        .max_age(Duration::from_secs(3600))
}

/// `GET /l/{resource_type}`
pub async fn list_by_type(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
) -> Result<Response, ApiError> {
    check_allowed(&state, &resource_type)?;
    stream_listing(&state, RecordFilter::ResourceType(resource_type)).await
}

/// `GET /l/{resource_type}/{id}`
pub async fn list_by_uri(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    check_allowed(&state, &resource_type)?;
    stream_listing(&state, RecordFilter::Uri(format!("{resource_type}/{id}"))).await
}

fn check_allowed(state: &AppState, resource_type: &str) -> Result<(), ApiError> {
    if state.config.listing.is_denied(resource_type) {
        tracing::warn!(resource_type, "Listing denied for resource type");
        return Err(ApiError::Forbidden(format!(
            "Listing '{resource_type}' is not allowed"
        )));
    }
    Ok(())
}

#[tracing::instrument(name = "listing.stream", skip(state))]
async fn stream_listing(state: &AppState, filter: RecordFilter) -> Result<Response, ApiError> {
    // Fetch the first page up front so store failures still get a 500
    let first = state
        .store
        .list(&filter, None, LISTING_PAGE_SIZE)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to list records: {e}")))?;

    let listing = Listing {
        store: state.store.clone(),
        filter,
        pending: Some(first),
        after: None,
        written: 0,
        records: 0,
        max_bytes: state.config.limits.listing_max_bytes,
        finished: false,
    };

    let stream = futures::stream::try_unfold(listing, |mut listing| async move {
        let chunk = listing.next_chunk().await?;
        Ok::<_, io::Error>(chunk.map(|chunk| (chunk, listing)))
    });

    Ok((
        [(CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response())
}

struct Listing {
    store: Arc<dyn ArchiveStore>,
    filter: RecordFilter,
    pending: Option<ListPage>,
    after: Option<StoreCursor>,
    /// Record bytes emitted so far.
    written: u64,
    records: usize,
    max_bytes: u64,
    finished: bool,
}

impl Listing {
    /// Render the next page as one body chunk; `None` once the array is closed.
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if self.finished {
            return Ok(None);
        }

        let mut chunk = Vec::new();
        let page = match self.pending.take() {
            Some(first) => {
                chunk.push(b'[');
                first
            }
            None => self
                .store
                .list(&self.filter, self.after.as_ref(), LISTING_PAGE_SIZE)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Listing aborted by store error");
                    io::Error::other(e)
                })?,
        };

        let mut limit_reached = false;
        for record in &page.records {
            if self.records > 0 {
                chunk.push(b',');
            }
            let mut out = CountingWriter::new(&mut chunk);
            write_record(&mut out, record)?;
            self.written += out.written();
            self.records += 1;

            if self.written >= self.max_bytes {
                limit_reached = true;
                break;
            }
        }

        match page.next {
            Some(next) if !limit_reached => self.after = Some(next),
            _ => {
                chunk.push(b']');
                self.finished = true;
            }
        }

        Ok(Some(Bytes::from(chunk)))
    }
}

/// `{"fetchdate":..,"hookdate":..,"digest":..,"resource":<stored JSON or null>}`
fn write_record<W: Write>(out: &mut W, record: &ArchiveRecord) -> io::Result<()> {
    out.write_all(br#"{"fetchdate":"#)?;
    serde_json::to_writer(
        &mut *out,
        &record.fetch_date.format(FETCH_DATE_FORMAT).to_string(),
    )?;
    out.write_all(br#","hookdate":"#)?;
    serde_json::to_writer(&mut *out, &record.hook_date)?;
    out.write_all(br#","digest":"#)?;
    serde_json::to_writer(&mut *out, &record.digest)?;
    out.write_all(br#","resource":"#)?;
    if record.data.is_empty() {
        out.write_all(b"null")?;
    } else {
        unpack_to(record.data.as_slice(), out).map_err(io::Error::other)?;
    }
    out.write_all(b"}")
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{config::HookvaultConfig, streaming::pack_bytes, tests::TestApp};

    async fn seed(app: &TestApp, uri: &str, count: usize, body: &[u8]) {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let resource_type = uri.split('/').next().unwrap_or_default();
        for i in 0..count {
            let record = ArchiveRecord {
                fetch_date: base + Duration::seconds(i as i64),
                ..ArchiveRecord::new(
                    uri,
                    resource_type,
                    format!("hook-{i}"),
                    pack_bytes(body).unwrap(),
                    format!("digest-{i}"),
                )
            };
            app.state().store.put(record).await.unwrap();
        }
    }

    async fn get(app: &TestApp, uri: &str) -> (StatusCode, Response) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.router().oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
        let (status, response) = get(app, uri).await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_lists_records_newest_first() {
        let app = TestApp::new().await;
        seed(&app, "invoices/42", 3, br#"{"total":1}"#).await;
        seed(&app, "invoices/43", 1, br#"{"total":2}"#).await;

        let (status, json) = get_json(&app, "/l/invoices/42").await;
        assert_eq!(status, StatusCode::OK);
        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["hookdate"], "hook-2");
        assert_eq!(records[0]["fetchdate"], "2024-03-01T10:00:02Z");
        assert_eq!(records[0]["digest"], "digest-2");
        assert_eq!(records[0]["resource"], serde_json::json!({"total": 1}));
        assert_eq!(records[2]["hookdate"], "hook-0");

        let (_, by_type) = get_json(&app, "/l/invoices").await;
        assert_eq!(by_type.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_pages_through_many_records() {
        let app = TestApp::new().await;
        seed(&app, "orders/1", LISTING_PAGE_SIZE * 2 + 3, b"{}").await;

        let (_, json) = get_json(&app, "/l/orders/1").await;
        assert_eq!(json.as_array().unwrap().len(), LISTING_PAGE_SIZE * 2 + 3);
    }

    #[tokio::test]
    async fn test_empty_listing_is_empty_array() {
        let app = TestApp::new().await;
        let (status, json) = get_json(&app, "/l/nothing/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_output_stops_after_record_crossing_limit() {
        let mut config = TestApp::config();
        config.limits.listing_max_bytes = 250;
        let app = TestApp::with_config(config).await;
        let body = format!(r#"{{"blob":"{}"}}"#, "x".repeat(100));
        seed(&app, "big/1", 10, body.as_bytes()).await;

        let (status, json) = get_json(&app, "/l/big/1").await;
        assert_eq!(status, StatusCode::OK);
        // Each record renders to well over 125 bytes, so the second crosses 250
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_denied_resource_type() {
        let mut config: HookvaultConfig = TestApp::config();
        config.listing.denied_resource_types = vec!["customers".into()];
        let app = TestApp::with_config(config).await;

        let (status, _) = get(&app, "/l/customers/1").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = get(&app, "/l/customers").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let app = TestApp::new().await;
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/l/invoices/42")
            .header("Origin", "https://viewer.example")
            .header("Access-Control-Request-Method", "GET")
            .header("Access-Control-Request-Headers", "x-custom")
            .body(Body::empty())
            .unwrap();

        let response = app.router().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-headers"], "x-custom");
        assert_eq!(headers["access-control-max-age"], "3600");

        let (_, response) = get(&app, "/l/invoices/42").await;
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }
}
