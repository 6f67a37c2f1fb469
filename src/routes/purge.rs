//! Purge triggers: the daily cron hook and the admin purge endpoint.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::error::ApiError;
use crate::{AppState, purge::enqueue_purge};

/// `GET /cron/daily`
///
/// Starts a purge of everything older than the retention window.
#[tracing::instrument(name = "purge.daily", skip(state))]
pub async fn daily(State(state): State<AppState>) -> Result<Json<&'static str>, ApiError> {
    let deadline = state.config.retention.deadline(Utc::now());
    let handle = enqueue_purge(state.dispatcher.as_ref(), deadline)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to enqueue purge: {e}")))?;

    tracing::info!(task = %handle.name, %deadline, "Daily purge enqueued");
    Ok(Json("OK"))
}

#[derive(Debug, Deserialize)]
struct PurgeRequest {
    #[serde(alias = "Before")]
    before: String,
}

/// `POST /purge`
///
/// Body: `{"before": "YYYY-MM-DD"}`. Purges records fetched before midnight
/// UTC of that day. Requires `Authorization: Bearer <admin_token>`.
#[tracing::instrument(name = "purge.admin", skip_all)]
pub async fn admin_purge(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<&'static str>, ApiError> {
    let Some(expected) = state.config.app.admin_token.as_deref() else {
        return Err(ApiError::Unauthorized);
    };
    if !bearer_matches(&headers, expected) {
        tracing::warn!("Rejected admin purge: bad or missing token");
        return Err(ApiError::Unauthorized);
    }

    let request: PurgeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid purge request: {e}")))?;
    let day = NaiveDate::parse_from_str(&request.before, "%Y-%m-%d")
        .map_err(|e| ApiError::BadRequest(format!("Invalid date '{}': {e}", request.before)))?;
    let deadline = day.and_time(chrono::NaiveTime::MIN).and_utc();

    let handle = enqueue_purge(state.dispatcher.as_ref(), deadline)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to enqueue purge: {e}")))?;

    tracing::info!(task = %handle.name, %deadline, "Admin purge enqueued");
    Ok(Json("OK"))
}

fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|given| bool::from(given.as_bytes().ct_eq(expected.as_bytes())))
}
