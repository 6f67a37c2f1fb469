use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    error::{DispatchError, DispatchResult},
    memory::{apply_reschedule, lease_from_index},
    traits::{TaskEntry, TaskQueue},
};

/// File-backed task queue.
///
/// Each pending task is one JSON file in `path`, rewritten on every state
/// change and deleted on removal. An in-memory index serves reads and is
/// rebuilt from the directory on startup, so enqueued work survives restarts.
pub struct FileTaskQueue {
    path: PathBuf,
    index: RwLock<HashMap<Uuid, TaskEntry>>,
}

impl FileTaskQueue {
    pub async fn new(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&path).await?;

        let queue = Self {
            path,
            index: RwLock::new(HashMap::new()),
        };
        queue.load_from_disk().await?;

        Ok(queue)
    }

    async fn load_from_disk(&self) -> DispatchResult<()> {
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        let mut index = self.index.write().await;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match self.load_entry_file(&path).await {
                    Ok(task) => {
                        index.insert(task.id, task);
                    }
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "Failed to load task file");
                    }
                }
            }
        }

        tracing::info!(
            path = ?self.path,
            tasks = index.len(),
            "Loaded pending tasks from disk"
        );

        Ok(())
    }

    async fn load_entry_file(&self, path: &Path) -> DispatchResult<TaskEntry> {
        let contents = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&contents).map_err(|e| DispatchError::Deserialization(e.to_string()))
    }

    fn entry_path(&self, id: Uuid) -> PathBuf {
        self.path.join(format!("{}.json", id))
    }

    /// Write through a temp file so a crash never leaves a half-written task.
    async fn write_entry(&self, entry: &TaskEntry) -> DispatchResult<()> {
        let path = self.entry_path(entry.id);
        let tmp = self.path.join(format!("{}.json.tmp", entry.id));
        let json =
            serde_json::to_vec(entry).map_err(|e| DispatchError::Serialization(e.to_string()))?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete_entry_file(&self, id: Uuid) -> DispatchResult<bool> {
        match tokio::fs::remove_file(self.entry_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TaskQueue for FileTaskQueue {
    async fn push(&self, entry: TaskEntry) -> DispatchResult<()> {
        // Disk first: an enqueue that returned Ok must survive a crash
        self.write_entry(&entry).await?;
        self.index.write().await.insert(entry.id, entry);
        Ok(())
    }

    async fn lease_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> DispatchResult<Vec<TaskEntry>> {
        // Leases are not persisted; after a restart every task is due again.
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
        let updated = apply_reschedule(&mut index, id, not_before, error)?;
        drop(index);

        self.write_entry(&updated).await
    }

    async fn remove(&self, id: Uuid) -> DispatchResult<bool> {
        let mut index = self.index.write().await;

        if index.remove(&id).is_some() {
            drop(index);
            self.delete_entry_file(id).await
        } else {
            Ok(false)
        }
    }

    async fn get(&self, id: Uuid) -> DispatchResult<Option<TaskEntry>> {
        Ok(self.index.read().await.get(&id).cloned())
    }

    async fn len(&self) -> DispatchResult<u64> {
        Ok(self.index.read().await.len() as u64)
    }
}
