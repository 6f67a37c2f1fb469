use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{
    error::DispatchResult,
    traits::{Dispatcher, TaskEntry, TaskHandle, TaskKind, TaskQueue},
};
use crate::observability::metrics;

/// [`Dispatcher`] that writes tasks to a [`TaskQueue`] and wakes the worker.
#[derive(Clone)]
pub struct QueueDispatcher {
    queue: Arc<dyn TaskQueue>,
    wake: Arc<Notify>,
}

impl QueueDispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            queue,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Signalled after every enqueue so an idle worker polls immediately.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn enqueue(&self, kind: TaskKind, payload: Vec<u8>) -> DispatchResult<TaskHandle> {
        let entry = TaskEntry::new(kind, payload);
        let handle = entry.handle();

        self.queue.push(entry).await?;
        self.wake.notify_one();

        metrics::record_task_enqueued(kind.as_str());
        tracing::debug!(task = %handle.name, "Enqueued task");

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MemoryTaskQueue;

    #[tokio::test]
    async fn test_enqueue_persists_entry() {
        let queue = Arc::new(MemoryTaskQueue::new());
        let dispatcher = QueueDispatcher::new(queue.clone());

        let handle = dispatcher
            .enqueue(TaskKind::PurgeStep, b"cursor".to_vec())
            .await
            .unwrap();

        let stored = queue.get(handle.id).await.unwrap().unwrap();
        assert_eq!(stored.kind, TaskKind::PurgeStep);
        assert_eq!(stored.payload, b"cursor");
        assert_eq!(stored.attempts, 0);
        assert_eq!(handle.name, stored.name());
    }

    #[tokio::test]
    async fn test_enqueue_wakes_worker() {
        let dispatcher = QueueDispatcher::new(Arc::new(MemoryTaskQueue::new()));
        let wake = dispatcher.wake_handle();

        dispatcher
            .enqueue(TaskKind::ProcessHook, Vec::new())
            .await
            .unwrap();

        // notify_one stores a permit when nobody is waiting yet
        tokio::time::timeout(std::time::Duration::from_secs(1), wake.notified())
            .await
            .unwrap();
    }
}
