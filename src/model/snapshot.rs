//! Point-in-time view of the backend queue.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// A pending task in the bounded preview of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    pub id: u64,
    pub waiting_ms: u64,
}

/// Kind of a recent-events entry.
///
/// Mirrors the task lifecycle. Kinds this client does not know decode as
/// `Unknown` instead of failing the whole snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enqueued,
    Started,
    Completed,
    Failed,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Lifecycle status this event moved the task into, if known.
    pub fn status(self) -> Option<TaskStatus> {
        match self {
            EventKind::Enqueued => Some(TaskStatus::Enqueued),
            EventKind::Started => Some(TaskStatus::Started),
            EventKind::Completed => Some(TaskStatus::Completed),
            EventKind::Failed => Some(TaskStatus::Failed),
            EventKind::Rejected => Some(TaskStatus::Rejected),
            EventKind::Unknown => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => f.write_str(status.as_str()),
            None => f.write_str("unknown"),
        }
    }
}

/// One transition in the recent-events log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEvent {
    pub task_id: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Per-day rollup of processed and rejected tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub processed: u64,
    pub rejected: u64,
}

/// Operational state of the queue at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Tasks waiting.
    pub queue_length: u32,
    /// Tasks currently executing.
    pub processing: u32,
    /// Worker capacity.
    pub max_concurrency: u32,
    #[serde(default)]
    pub estimated_wait_ms: Option<u64>,
    #[serde(default)]
    pub oldest_waiting_ms: Option<u64>,
    /// Bounded preview of the pending set, in queue order.
    #[serde(default)]
    pub pending_sample: Vec<PendingTask>,
    /// Most recent first.
    #[serde(default)]
    pub recent_events: Vec<QueueEvent>,
    /// One entry per calendar day.
    #[serde(default)]
    pub daily_totals: Vec<DailyTotal>,
}

impl QueueSnapshot {
    /// Lists the snapshot invariants this payload breaks, if any.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.processing > self.max_concurrency {
            violations.push(format!(
                "processing ({}) exceeds maxConcurrency ({})",
                self.processing, self.max_concurrency
            ));
        }
        if (self.queue_length as usize) < self.pending_sample.len() {
            violations.push(format!(
                "queueLength ({}) is shorter than pendingSample ({})",
                self.queue_length,
                self.pending_sample.len()
            ));
        }
        violations
    }

    /// Fraction of worker capacity in use, in `0.0..=1.0`.
    pub fn utilization(&self) -> f64 {
        if self.max_concurrency == 0 {
            return 0.0;
        }
        (self.processing as f64 / self.max_concurrency as f64).min(1.0)
    }

    /// Workers not currently executing a task.
    pub fn available_slots(&self) -> u32 {
        self.max_concurrency.saturating_sub(self.processing)
    }

    /// Whether nothing is waiting or running.
    pub fn is_idle(&self) -> bool {
        self.queue_length == 0 && self.processing == 0
    }

    /// Rollup for the most recent day, if any.
    pub fn latest_daily_total(&self) -> Option<&DailyTotal> {
        self.daily_totals.iter().max_by_key(|total| total.date)
    }
}
