use std::{io, sync::Arc};

use futures::TryStreamExt;
use http::header::CONTENT_TYPE;
use tokio_util::io::StreamReader;

use super::{
    error::{ArchiveError, ArchiveResult},
    event::EventRecord,
};
use crate::{
    config::LimitsConfig,
    dispatch::TaskOutcome,
    integrity::DigestWriter,
    observability::metrics,
    store::{ArchiveRecord, ArchiveStore},
    streaming::{BoundedReader, FanOut, Packer, drain},
};

/// Header carrying the application key on resource fetches.
pub const APPLICATION_KEY_HEADER: &str = "X-Application-Key";

/// Fetches the resource an event points at and archives it.
pub struct Archiver {
    client: reqwest::Client,
    store: Arc<dyn ArchiveStore>,
    app_key: String,
    fetch_max_bytes: u64,
    max_blob_bytes: u64,
}

impl Archiver {
    pub fn new(
        client: reqwest::Client,
        store: Arc<dyn ArchiveStore>,
        app_key: impl Into<String>,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            client,
            store,
            app_key: app_key.into(),
            fetch_max_bytes: limits.fetch_max_bytes,
            max_blob_bytes: limits.max_blob_bytes,
        }
    }

    /// Fetch, verify and store one event's resource.
    ///
    /// The body is read exactly once: every chunk goes to a raw buffer, the
    /// SHA-256 digest and the gzip encoder together. Oversized bodies and
    /// oversized compressed blobs are abandoned; transport, upstream, JSON
    /// and store failures are returned for retry.
    #[tracing::instrument(
        name = "archiver.save_resource",
        skip_all,
        fields(resource = %event.resource, href = %event.data.href)
    )]
    pub async fn save_resource(&self, event: &EventRecord) -> ArchiveResult<TaskOutcome> {
        let uri = match event.uri() {
            Ok(uri) => uri,
            Err(e) => return Ok(self.abandon(event, e.to_string())),
        };

        let href = event.data.href.as_str();
        let url = match url::Url::parse(href) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return Ok(self.abandon(event, format!("unusable href '{href}'"))),
        };

        let response = self
            .client
            .get(url)
            .header(APPLICATION_KEY_HEADER, &self.app_key)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|source| ArchiveError::Fetch {
                href: href.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::UpstreamStatus {
                href: href.to_string(),
                status: status.as_u16(),
            });
        }

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        let mut reader = BoundedReader::new(StreamReader::new(body), self.fetch_max_bytes);

        let mut raw = Vec::new();
        let mut digest = DigestWriter::new();
        let mut packer = Packer::new();
        let drained = {
            let mut tee = FanOut::new()
                .with(&mut raw)
                .with(&mut digest)
                .with(&mut packer);
            drain(&mut reader, &mut tee).await
        };

        match drained {
            Ok(_) => {}
            Err(e) if e.is_cap_exceeded() => {
                return Ok(self.abandon(event, format!("body exceeds {} bytes", self.fetch_max_bytes)));
            }
            Err(source) => {
                return Err(ArchiveError::Stream {
                    href: href.to_string(),
                    source,
                });
            }
        }

        let data = packer.finish().map_err(|source| ArchiveError::Stream {
            href: href.to_string(),
            source,
        })?;
        if data.len() as u64 > self.max_blob_bytes {
            return Ok(self.abandon(
                event,
                format!("compressed body is {} bytes, limit {}", data.len(), self.max_blob_bytes),
            ));
        }

        serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&raw)
            .map_err(ArchiveError::InvalidJson)?;

        let record = ArchiveRecord::new(
            uri,
            event.resource.clone(),
            event.created.clone(),
            data,
            digest.finalize_hex(),
        );
        let compressed_bytes = record.data.len();
        let id = self.store.put(record).await?;

        metrics::record_archive_outcome("stored");
        tracing::info!(
            record_id = %id,
            raw_bytes = raw.len(),
            compressed_bytes,
            "Archived resource"
        );

        Ok(TaskOutcome::Completed)
    }

    fn abandon(&self, event: &EventRecord, reason: String) -> TaskOutcome {
        metrics::record_archive_outcome("abandoned");
        tracing::error!(reason = %reason, "Abandoning resource");
        TaskOutcome::abandoned(reason)
    }
}
