use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    error::{DispatchError, DispatchResult},
    traits::{TaskEntry, TaskQueue},
};

/// In-process task queue. Pending work does not survive a restart.
#[derive(Default)]
pub struct MemoryTaskQueue {
    index: RwLock<HashMap<Uuid, TaskEntry>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all pending entries, oldest first.
    pub async fn entries(&self) -> Vec<TaskEntry> {
        let mut entries: Vec<TaskEntry> = self.index.read().await.values().cloned().collect();
        entries.sort_by_key(|entry| (entry.created_at, entry.id));
        entries
    }
}

/// Pick the due entries, oldest first, and push their `not_before` out to
/// `lease_until`. Returns copies of the leased entries.
pub(super) fn lease_from_index(
    index: &mut HashMap<Uuid, TaskEntry>,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
    limit: usize,
) -> Vec<TaskEntry> {
    let mut due: Vec<&mut TaskEntry> = index
        .values_mut()
        .filter(|entry| entry.not_before <= now)
        .collect();
    due.sort_by_key(|entry| (entry.not_before, entry.created_at, entry.id));

    due.into_iter()
        .take(limit)
        .map(|entry| {
            let leased = entry.clone();
            entry.not_before = lease_until;
            leased
        })
        .collect()
}

pub(super) fn apply_reschedule(
    index: &mut HashMap<Uuid, TaskEntry>,
    id: Uuid,
    not_before: DateTime<Utc>,
    error: String,
) -> DispatchResult<TaskEntry> {
    let entry = index.get_mut(&id).ok_or(DispatchError::NotFound(id))?;
    entry.attempts += 1;
    entry.not_before = not_before;
    entry.last_error = Some(error);
    Ok(entry.clone())
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn push(&self, entry: TaskEntry) -> DispatchResult<()> {
        self.index.write().await.insert(entry.id, entry);
        Ok(())
    }

    async fn lease_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> DispatchResult<Vec<TaskEntry>> {
        let mut index = self.index.write().await;
        Ok(lease_from_index(&mut index, now, lease_until, limit))
    }

    async fn reschedule(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        error: String,
    ) -> DispatchResult<()> {
        let mut index = self.index.write().await;
        apply_reschedule(&mut index, id, not_before, error)?;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> DispatchResult<bool> {
        Ok(self.index.write().await.remove(&id).is_some())
    }

    async fn get(&self, id: Uuid) -> DispatchResult<Option<TaskEntry>> {
        Ok(self.index.read().await.get(&id).cloned())
    }

    async fn len(&self) -> DispatchResult<u64> {
        Ok(self.index.read().await.len() as u64)
    }
}
