//! Task records as reported by the backend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a queued task.
///
/// ```text
/// enqueued --> started --> completed
/// enqueued --> rejected
/// started  --> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Enqueued,
    Started,
    Completed,
    Failed,
    Rejected,
}

impl TaskStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Enqueued,
        TaskStatus::Started,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Rejected,
    ];

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Rejected
        )
    }

    /// Whether the backend may move a task from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Enqueued, TaskStatus::Started)
                | (TaskStatus::Enqueued, TaskStatus::Rejected)
                | (TaskStatus::Started, TaskStatus::Completed)
                | (TaskStatus::Started, TaskStatus::Failed)
        )
    }

    /// Position in the lifecycle: 0 pending, 1 running, 2 finished.
    fn progress(self) -> u8 {
        match self {
            TaskStatus::Enqueued => 0,
            TaskStatus::Started => 1,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Rejected => 2,
        }
    }

    /// Wire name, as sent in the `status` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Enqueued => "enqueued",
            TaskStatus::Started => "started",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown task status: {}", s))
    }
}

/// One unit of queued work and its outcome.
///
/// The client never mutates a task; fresher reads replace the local copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub status: TaskStatus,
    pub method: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usuario_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usuario_nombre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usuario_rol: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_ms: Option<u64>,
    #[serde(default)]
    pub queue_length_at_enqueue: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Task {
    /// Time spent waiting before execution, reported or derived from timestamps.
    pub fn wait_time_ms(&self) -> Option<u64> {
        self.wait_time_ms
            .or_else(|| span_ms(self.enqueued_at, self.started_at?))
    }

    /// Time spent executing, reported or derived from timestamps.
    pub fn execution_time_ms(&self) -> Option<u64> {
        self.execution_time_ms
            .or_else(|| span_ms(self.started_at?, self.completed_at?))
    }

    /// End-to-end time, reported or derived from timestamps.
    pub fn total_time_ms(&self) -> Option<u64> {
        self.total_time_ms
            .or_else(|| span_ms(self.enqueued_at, self.completed_at?))
    }

    /// Most recent transition timestamp known for this task.
    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.completed_at
            .or(self.started_at)
            .unwrap_or(self.enqueued_at)
    }

    /// Whether `self` is a fresher read of the same task than `other`.
    ///
    /// A copy further along the lifecycle wins; at equal progress the later
    /// transition timestamp wins. Copies of different tasks never compare newer.
    pub fn is_newer_than(&self, other: &Task) -> bool {
        if self.id != other.id {
            return false;
        }
        match self.status.progress().cmp(&other.status.progress()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.last_transition_at() > other.last_transition_at(),
        }
    }

    /// Display name of the requester, if the backend reported one.
    pub fn requester(&self) -> Option<String> {
        match (&self.usuario_nombre, self.usuario_id) {
            (Some(name), _) => Some(name.clone()),
            (None, Some(id)) => Some(format!("#{}", id)),
            (None, None) => None,
        }
    }
}

fn span_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> Option<u64> {
    u64::try_from((to - from).num_milliseconds()).ok()
}
