//! Webhook intake.

use std::io;

use axum::{
    body::Body,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use super::error::ApiError;
use crate::{
    AppState,
    dispatch::TaskKind,
    integrity::SignatureWriter,
    observability::metrics,
    streaming::{BoundedReader, FanOut, Packer, drain},
};

/// Hex HMAC-SHA256 of the request body, keyed by the application key.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Hex SHA-256 of the application key, returned on accepted webhooks.
pub const CONTENT_KEY_HEADER: &str = "X-Content-Key";

/// `POST /r`
///
/// The body is read once, through the size ceiling, into the signer and the
/// gzip encoder together. Nothing is answered until the body is fully
/// drained. A verified body is enqueued compressed as a `process-hook` task.
#[tracing::instrument(name = "ingress.receive", skip_all)]
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let limit = state.config.limits.ingest_max_bytes;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut signer = SignatureWriter::new(state.config.app.key.as_bytes())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut packer = Packer::new();

    let stream = Box::pin(body.into_data_stream().map_err(io::Error::other));
    let mut reader = BoundedReader::new(StreamReader::new(stream), limit);
    let drained = {
        let mut tee = FanOut::new().with(&mut signer).with(&mut packer);
        drain(&mut reader, &mut tee).await
    };

    let bytes = match drained {
        Ok(bytes) => bytes,
        Err(e) if e.is_cap_exceeded() => {
            metrics::record_ingress("too_large", reader.bytes_read());
            tracing::warn!(limit, "Rejected webhook: body too large");
            return Err(ApiError::PayloadTooLarge { limit });
        }
        Err(e) => {
            metrics::record_ingress("read_error", reader.bytes_read());
            return Err(ApiError::BadRequest(format!("Failed to read body: {e}")));
        }
    };

    let authentic = signature.is_some_and(|sig| signer.verify(&sig).is_ok());
    if !authentic {
        metrics::record_ingress("rejected", bytes);
        tracing::warn!(bytes, "Rejected webhook: signature verification failed");
        return Err(ApiError::BadRequest("Invalid signature".into()));
    }

    let payload = packer
        .finish()
        .map_err(|e| ApiError::Internal(format!("failed to compress body: {e}")))?;

    let handle = state
        .dispatcher
        .enqueue(TaskKind::ProcessHook, payload)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to enqueue webhook: {e}")))?;

    metrics::record_ingress("accepted", bytes);
    tracing::info!(task = %handle.name, bytes, "Accepted webhook");

    Ok(([(CONTENT_KEY_HEADER, state.key_hash.to_string())], "OK").into_response())
}
