use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};

use crate::store::{CursorError, StoreCursor};

/// Where a purge job resumes, scoped to the deadline it was started with.
///
/// Travels only inside `purge-step` task payloads, as the opaque string
/// returned by [`encode`](Self::encode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeCursor {
    pub deadline: DateTime<Utc>,
    pub position: StoreCursor,
}

impl PurgeCursor {
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}:{}",
            self.deadline.timestamp_millis(),
            self.position.encode()
        );
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim())?;
        let raw = String::from_utf8(bytes).map_err(|_| CursorError::InvalidFormat)?;
        let (millis, position) = raw.split_once(':').ok_or(CursorError::InvalidFormat)?;

        let millis: i64 = millis.parse().map_err(|_| CursorError::InvalidTimestamp)?;
        let deadline =
            DateTime::from_timestamp_millis(millis).ok_or(CursorError::InvalidTimestamp)?;

        Ok(Self {
            deadline,
            position: StoreCursor::decode(position)?,
        })
    }
}
