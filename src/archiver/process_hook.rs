use super::{
    error::{ArchiveError, ArchiveResult},
    event::decode_batch,
};
use crate::{
    dispatch::{Dispatcher, TaskKind, TaskOutcome},
    streaming::unpack,
};

/// Fan a compressed webhook batch out into one `save-resource` task per event.
///
/// A payload that cannot be unpacked or decoded is abandoned. Any enqueue
/// failure fails the whole batch, so events enqueued before it are enqueued
/// again on redelivery.
#[tracing::instrument(name = "archiver.process_hook", skip_all, fields(payload_bytes = payload.len()))]
pub async fn process_hook(dispatcher: &dyn Dispatcher, payload: &[u8]) -> ArchiveResult<TaskOutcome> {
    let raw = match unpack(payload) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(error = %e, "Abandoning webhook batch: payload does not unpack");
            return Ok(TaskOutcome::abandoned(format!("failed to unpack payload: {e}")));
        }
    };

    let events = match decode_batch(raw.as_slice()) {
        Ok(events) => events,
        Err(e) => {
            tracing::error!(error = %e, "Abandoning webhook batch: invalid event JSON");
            return Ok(TaskOutcome::abandoned(format!("failed to decode events: {e}")));
        }
    };

    for event in &events {
        let body = serde_json::to_vec(event).map_err(ArchiveError::Encode)?;
        dispatcher.enqueue(TaskKind::SaveResource, body).await?;
    }

    tracing::debug!(events = events.len(), "Webhook batch fanned out");
    Ok(TaskOutcome::Completed)
}
