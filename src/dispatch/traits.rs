use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DispatchResult;

/// The fixed set of task kinds. Each kind is served by exactly one handler
/// endpoint under `/task/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    ProcessHook,
    SaveResource,
    PurgeBefore,
    PurgeStep,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::ProcessHook,
        TaskKind::SaveResource,
        TaskKind::PurgeBefore,
        TaskKind::PurgeStep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ProcessHook => "process-hook",
            TaskKind::SaveResource => "save-resource",
            TaskKind::PurgeBefore => "purge-before",
            TaskKind::PurgeStep => "purge-step",
        }
    }

    /// Path of the handler endpoint for this kind.
    pub fn handler_path(&self) -> &'static str {
        match self {
            TaskKind::ProcessHook => "/task/process-hook",
            TaskKind::SaveResource => "/task/save-resource",
            TaskKind::PurgeBefore => "/task/purge-before",
            TaskKind::PurgeStep => "/task/purge-step",
        }
    }

    /// Key of this kind's table under `[dispatcher.retry]`.
    pub fn config_key(&self) -> &'static str {
        match self {
            TaskKind::ProcessHook => "process_hook",
            TaskKind::SaveResource => "save_resource",
            TaskKind::PurgeBefore => "purge_before",
            TaskKind::PurgeStep => "purge_step",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown task kind '{s}'"))
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    pub id: Uuid,
    pub kind: TaskKind,
    /// Opaque handler payload, base64 in the serialized form.
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    /// Failed invocations so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    /// The task is not handed to a worker before this instant.
    pub not_before: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl TaskEntry {
    pub fn new(kind: TaskKind, payload: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            attempts: 0,
            created_at: now,
            not_before: now,
            last_error: None,
        }
    }

    /// Name sent in the `X-Task-Name` header.
    pub fn name(&self) -> String {
        format!("{}-{}", self.kind, self.id)
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            kind: self.kind,
            name: self.name(),
        }
    }
}

/// Returned by [`Dispatcher::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: Uuid,
    pub kind: TaskKind,
    pub name: String,
}

/// What a handler decided about its task.
///
/// Both variants acknowledge the task. Handlers signal "retry me" by
/// returning an error instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// The input can never succeed; it is dropped after logging.
    Abandoned { reason: String },
}

impl TaskOutcome {
    pub fn abandoned(reason: impl Into<String>) -> Self {
        Self::Abandoned {
            reason: reason.into(),
        }
    }

    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned { .. })
    }
}

/// Enqueue-now, invoke-later task submission.
///
/// Delivery is at least once: handlers may see the same payload more than
/// once and must tolerate it.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn enqueue(&self, kind: TaskKind, payload: Vec<u8>) -> DispatchResult<TaskHandle>;
}

/// Storage for pending tasks.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn push(&self, entry: TaskEntry) -> DispatchResult<()>;

    /// Lease up to `limit` tasks that are due at `now`, oldest first.
    ///
    /// Leased tasks have `not_before` moved to `lease_until` so concurrent
    /// polls skip them; a worker that dies mid-invocation leaves them to be
    /// picked up again once the lease runs out.
    async fn lease_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: usize,
    ) -> DispatchResult<Vec<TaskEntry>>;

    /// Record a failed attempt and push the task back to `not_before`.
    async fn reschedule(
        &self,
        id: Uuid,
        not_before: DateTime<Utc>,
        error: String,
    ) -> DispatchResult<()>;

    /// Remove a task (after success or abandonment).
    async fn remove(&self, id: Uuid) -> DispatchResult<bool>;

    async fn get(&self, id: Uuid) -> DispatchResult<Option<TaskEntry>>;

    async fn len(&self) -> DispatchResult<u64>;

    async fn is_empty(&self) -> DispatchResult<bool> {
        Ok(self.len().await? == 0)
    }
}

mod payload_base64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_paths() {
        assert_eq!(TaskKind::ProcessHook.handler_path(), "/task/process-hook");
        assert_eq!(TaskKind::PurgeStep.handler_path(), "/task/purge-step");
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
            assert!(kind.handler_path().ends_with(kind.as_str()));
        }
        assert!("purge".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_entry_serializes_payload_as_base64() {
        let entry = TaskEntry::new(TaskKind::SaveResource, vec![0, 159, 146, 150]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "save-resource");
        assert_eq!(json["payload"], "AJ+Slg==");

        let back: TaskEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.payload, entry.payload);
        assert_eq!(back.id, entry.id);
    }

    #[test]
    fn test_name_includes_kind_and_id() {
        let entry = TaskEntry::new(TaskKind::PurgeBefore, Vec::new());
        assert_eq!(entry.name(), format!("purge-before-{}", entry.id));
        assert_eq!(entry.handle().name, entry.name());
    }
}
