//! Keyset position in the archive's `(fetch_date, id)` order.
//!
//! Timestamps are encoded with millisecond precision, so stored fetch dates
//! are truncated to milliseconds on write (see [`truncate_to_millis`]) and
//! a decoded cursor compares exactly against stored rows.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("invalid cursor format")]
    InvalidFormat,
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid timestamp in cursor")]
    InvalidTimestamp,
    #[error("invalid UUID in cursor")]
    InvalidUuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreCursor {
    pub fetch_date: DateTime<Utc>,
    pub id: Uuid,
}

impl StoreCursor {
    pub fn new(fetch_date: DateTime<Utc>, id: Uuid) -> Self {
        Self { fetch_date, id }
    }

    /// Encode the cursor as a URL-safe base64 string.
    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.fetch_date.timestamp_millis(), self.id);
        URL_SAFE_NO_PAD.encode(raw.as_bytes())
    }

    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
        let raw = String::from_utf8(bytes).map_err(|_| CursorError::InvalidFormat)?;
        let (millis, id) = raw.split_once(':').ok_or(CursorError::InvalidFormat)?;

        let millis: i64 = millis.parse().map_err(|_| CursorError::InvalidTimestamp)?;
        let fetch_date =
            DateTime::from_timestamp_millis(millis).ok_or(CursorError::InvalidTimestamp)?;
        let id = Uuid::parse_str(id).map_err(|_| CursorError::InvalidUuid)?;

        Ok(Self { fetch_date, id })
    }
}

/// Truncate a DateTime to millisecond precision.
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}
