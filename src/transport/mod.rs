//! Network boundary.
//!
//! A [`Transport`] performs exactly one read-only request per call and honors a
//! cooperative [`CancellationToken`]. Everything above it works with decoded
//! values; swapping the transport (for tests or another backend) does not
//! touch the cache, poller or fetchers.

mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{FetchError, FetchResult};
use crate::model::{HistoryPage, HistoryQuery, QueueSnapshot, StatsAggregate, StatsQuery};

pub use http::HttpTransport;

/// Addressable read-only resources on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// `GET status` -> `QueueSnapshot`
    Status,
    /// `GET history?...` -> `{tasks, total}`
    History(HistoryQuery),
    /// `GET stats?...` -> `StatsAggregate`
    Stats(StatsQuery),
}

impl Resource {
    /// Path relative to the backend root.
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Status => "status",
            Resource::History(_) => "history",
            Resource::Stats(_) => "stats",
        }
    }

    /// Query parameters for this resource. Unset filters are left out.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Resource::Status => Vec::new(),
            Resource::History(query) => query.query_pairs(),
            Resource::Stats(query) => query.query_pairs(),
        }
    }
}

/// One network call with cooperative cancellation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `resource`.
    ///
    /// Returns `FetchError::Cancelled` if `cancel` fires first. Cancelling does
    /// not guarantee the request stops on the wire, only that its result is
    /// not delivered.
    async fn fetch(&self, resource: &Resource, cancel: &CancellationToken) -> FetchResult<Value>;
}

/// A typed response body.
pub trait Payload: DeserializeOwned + Send + Sync + 'static {
    /// Consistency problems worth logging. A payload with problems is still
    /// accepted: the client reports backend state, it never repairs it.
    fn problems(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Payload for QueueSnapshot {
    fn problems(&self) -> Vec<String> {
        self.invariant_violations()
    }
}

impl Payload for HistoryPage {
    fn problems(&self) -> Vec<String> {
        if (self.tasks.len() as u64) > self.total {
            vec![format!(
                "page holds {} tasks but total is {}",
                self.tasks.len(),
                self.total
            )]
        } else {
            Vec::new()
        }
    }
}

impl Payload for StatsAggregate {}

/// Decodes a payload into its typed shape. Any mismatch is `Malformed`.
pub fn decode<T: DeserializeOwned>(payload: Value) -> FetchResult<T> {
    serde_json::from_value(payload).map_err(FetchError::from)
}

/// Fetches and decodes in one step, logging any payload problems.
pub async fn fetch_typed<T: Payload>(
    transport: &dyn Transport,
    resource: &Resource,
    cancel: &CancellationToken,
) -> FetchResult<T> {
    let payload = transport.fetch(resource, cancel).await?;
    let value: T = decode(payload)?;
    for problem in value.problems() {
        warn!(resource = resource.path(), problem = %problem, "inconsistent payload");
    }
    Ok(value)
}
