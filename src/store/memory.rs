use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    cursor::{StoreCursor, truncate_to_millis},
    error::StoreResult,
    traits::{ArchiveRecord, ArchiveStore, ListPage, RecordFilter, ScanPage},
};

#[derive(Default)]
struct Inner {
    /// Records in `(fetch_date, id)` order.
    records: BTreeMap<StoreCursor, ArchiveRecord>,
    /// id -> fetch_date, for deletes by key.
    by_id: HashMap<Uuid, DateTime<Utc>>,
}

/// In-memory archive store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn put(&self, mut record: ArchiveRecord) -> StoreResult<Uuid> {
        record.fetch_date = truncate_to_millis(record.fetch_date);
        let id = record.id;

        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.by_id.insert(id, record.fetch_date) {
            inner.records.remove(&StoreCursor::new(previous, id));
        }
        inner.records.insert(record.cursor(), record);

        Ok(id)
    }

    async fn list(
        &self,
        filter: &RecordFilter,
        after: Option<&StoreCursor>,
        limit: usize,
    ) -> StoreResult<ListPage> {
        let inner = self.inner.read().await;

        let records: Vec<ArchiveRecord> = inner
            .records
            .iter()
            .rev()
            .filter(|(key, _)| after.is_none_or(|after| *key < after))
            .filter(|(_, record)| filter.matches(record))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect();

        let next = if records.len() == limit {
            records.last().map(ArchiveRecord::cursor)
        } else {
            None
        };

        Ok(ListPage { records, next })
    }

    async fn scan_keys_before(
        &self,
        deadline: DateTime<Utc>,
        after: Option<&StoreCursor>,
        limit: usize,
    ) -> StoreResult<ScanPage> {
        let inner = self.inner.read().await;

        let page: Vec<StoreCursor> = inner
            .records
            .keys()
            .filter(|key| after.is_none_or(|after| *key > after))
            .take_while(|key| key.fetch_date < deadline)
            .take(limit)
            .copied()
            .collect();

        Ok(ScanPage {
            keys: page.iter().map(|key| key.id).collect(),
            cursor: page.last().copied().or(after.copied()),
        })
    }

    async fn delete_many(&self, keys: &[Uuid]) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let mut deleted = 0;

        for id in keys {
            if let Some(fetch_date) = inner.by_id.remove(id) {
                inner.records.remove(&StoreCursor::new(fetch_date, *id));
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.inner.read().await.records.len() as u64)
    }
}
