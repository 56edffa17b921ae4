//! Value objects exchanged with the queue backend.
//!
//! Every refresh produces fresh values that replace the previous ones; nothing
//! here is shared mutable state.

mod history;
mod snapshot;
mod stats;
mod task;

pub use history::{HistoryFilterPatch, HistoryFilters, HistoryPage, HistoryQuery, PageInfo};
pub use snapshot::{DailyTotal, EventKind, PendingTask, QueueEvent, QueueSnapshot};
pub use stats::{NamedCount, StatsAggregate, StatsQuery};
pub use task::{Task, TaskStatus};

#[cfg(test)]
pub(crate) use task::tests::sample_task;
