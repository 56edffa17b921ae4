//! Live-status client for a task-queue dashboard.
//!
//! Keeps a dashboard supplied with the queue's operational snapshot, a
//! filterable paginated task history and aggregate statistics, all fetched
//! from a read-only HTTP backend:
//!
//! - [`ResourceCache`] reuses a fresh status snapshot and coalesces concurrent
//!   requests into one network call.
//! - [`Poller`] refreshes a value on a fixed cadence, keeps the last good value
//!   through failures and discards superseded results.
//! - [`HistoryFetcher`] turns filters and page navigation into history requests.
//! - [`StatsFetcher`] loads aggregates on demand or on a slow cadence.
//! - [`Dashboard`] wires all of the above from a [`WatchConfig`].

pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod history;
pub mod logging;
pub mod model;
pub mod poller;
pub mod stats;
pub mod transport;

pub use cache::ResourceCache;
pub use config::{ConfigError, WatchConfig};
pub use dashboard::{Dashboard, DashboardError};
pub use error::{FetchError, FetchResult};
pub use history::{HistoryFetcher, HistoryView};
pub use logging::init_logging;
pub use model::{
    EventKind, HistoryFilterPatch, HistoryFilters, HistoryPage, HistoryQuery, PageInfo,
    QueueSnapshot, StatsAggregate, StatsQuery, Task, TaskStatus,
};
pub use poller::{DirectSource, FetchOutcome, PollPhase, PollState, Poller, Source};
pub use stats::{StatsFetcher, StatsSource};
pub use transport::{HttpTransport, Resource, Transport};
