//! In-process dispatcher double for handler tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    error::{DispatchError, DispatchResult},
    traits::{Dispatcher, TaskEntry, TaskHandle, TaskKind},
};

/// Records every enqueue instead of queueing it. Optionally starts failing
/// after a number of successful enqueues.
#[derive(Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<(TaskKind, Vec<u8>)>>,
    fail_after: Option<usize>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::default()
        }
    }

    pub fn tasks(&self) -> Vec<(TaskKind, Vec<u8>)> {
        self.tasks.lock().unwrap().clone()
    }

    /// Remove and return the recorded tasks.
    pub fn take(&self) -> Vec<(TaskKind, Vec<u8>)> {
        std::mem::take(&mut *self.tasks.lock().unwrap())
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn enqueue(&self, kind: TaskKind, payload: Vec<u8>) -> DispatchResult<TaskHandle> {
        let mut tasks = self.tasks.lock().unwrap();
        if self.fail_after.is_some_and(|limit| tasks.len() >= limit) {
            return Err(DispatchError::Internal("queue unavailable".into()));
        }
        let entry = TaskEntry::new(kind, payload.clone());
        tasks.push((kind, payload));
        Ok(entry.handle())
    }
}
