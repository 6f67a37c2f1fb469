use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    cursor::{StoreCursor, truncate_to_millis},
    error::StoreResult,
};

/// One archived resource.
///
/// Written once by the archiver, never updated, and removed only by the
/// retention purge. Several records may share a `uri`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    pub id: Uuid,
    /// `{resource}/{id}` of the originating event.
    pub uri: String,
    pub resource_type: String,
    /// Creation time supplied by the webhook sender, stored verbatim.
    pub hook_date: String,
    /// Gzip-compressed resource body.
    pub data: Vec<u8>,
    pub fetch_date: DateTime<Utc>,
    /// Hex SHA-256 of the uncompressed body.
    pub digest: String,
}

impl ArchiveRecord {
    /// New record fetched now, with a fresh id.
    pub fn new(
        uri: impl Into<String>,
        resource_type: impl Into<String>,
        hook_date: impl Into<String>,
        data: Vec<u8>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            uri: uri.into(),
            resource_type: resource_type.into(),
            hook_date: hook_date.into(),
            data,
            fetch_date: truncate_to_millis(Utc::now()),
            digest: digest.into(),
        }
    }

    pub fn cursor(&self) -> StoreCursor {
        StoreCursor::new(self.fetch_date, self.id)
    }
}

/// Equality filter for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    Uri(String),
    ResourceType(String),
}

impl RecordFilter {
    pub fn matches(&self, record: &ArchiveRecord) -> bool {
        match self {
            RecordFilter::Uri(uri) => &record.uri == uri,
            RecordFilter::ResourceType(ty) => &record.resource_type == ty,
        }
    }
}

/// A page of records, newest first.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub records: Vec<ArchiveRecord>,
    /// Position to continue from, if the page was full.
    pub next: Option<StoreCursor>,
}

/// A page of keys in ascending `(fetch_date, id)` order.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub keys: Vec<Uuid>,
    /// Position of the last key, or the starting position when no keys were found.
    pub cursor: Option<StoreCursor>,
}

/// Archive record storage.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn put(&self, record: ArchiveRecord) -> StoreResult<Uuid>;

    /// Records matching `filter`, newest first, strictly after `after` in
    /// that order.
    async fn list(
        &self,
        filter: &RecordFilter,
        after: Option<&StoreCursor>,
        limit: usize,
    ) -> StoreResult<ListPage>;

    /// Keys of records fetched before `deadline`, oldest first, strictly
    /// after `after`.
    async fn scan_keys_before(
        &self,
        deadline: DateTime<Utc>,
        after: Option<&StoreCursor>,
        limit: usize,
    ) -> StoreResult<ScanPage>;

    /// Delete the given keys in one batch. Keys that no longer exist are
    /// ignored. Returns how many records were removed.
    async fn delete_many(&self, keys: &[Uuid]) -> StoreResult<u64>;

    async fn count(&self) -> StoreResult<u64>;

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
