//! Aggregate statistics fetcher.
//!
//! Statistics are fetched on demand or on a slow periodic cadence through a
//! [`Poller`], with the same failure handling as the status poller: a failed
//! fetch leaves the previous aggregate visible and sets `error`.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;
use crate::model::{StatsAggregate, StatsQuery};
use crate::poller::{FetchOutcome, PollState, Poller, Source};
use crate::transport::{fetch_typed, Resource, Transport};

/// Default cadence for periodic statistics polling.
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Uncached source for `GET stats` with an adjustable query.
pub struct StatsSource {
    /// Network boundary used for every fetch.
    transport: Arc<dyn Transport>,
    /// Window and requester sent with the next fetch.
    query: RwLock<StatsQuery>,
}

impl StatsSource {
    /// Creates a source that will request `query`.
    pub fn new(transport: Arc<dyn Transport>, query: StatsQuery) -> Self {
        Self {
            transport,
            query: RwLock::new(query),
        }
    }

    /// The query the next fetch will send.
    pub fn query(&self) -> StatsQuery {
        self.query
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the query without fetching.
    pub fn set_query(&self, query: StatsQuery) {
        *self
            .query
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = query;
    }
}

#[async_trait]
impl Source<StatsAggregate> for StatsSource {
    fn name(&self) -> &str {
        "stats"
    }

    async fn load(&self, _force: bool, cancel: &CancellationToken) -> FetchResult<Arc<StatsAggregate>> {
        let resource = Resource::Stats(self.query());
        fetch_typed(self.transport.as_ref(), &resource, cancel)
            .await
            .map(Arc::new)
    }
}

/// On-demand or periodic statistics.
pub struct StatsFetcher {
    /// Holds the current query.
    source: Arc<StatsSource>,
    /// Drives on-demand and periodic fetches.
    poller: Poller<StatsAggregate>,
}

impl StatsFetcher {
    /// Creates an idle fetcher. Nothing is requested until [`StatsFetcher::load`],
    /// [`StatsFetcher::set_query`] or [`StatsFetcher::start`].
    ///
    /// # Arguments
    ///
    /// * `transport` - Network boundary used for every fetch
    /// * `query` - Initial window and requester filter
    pub fn new(transport: Arc<dyn Transport>, query: StatsQuery) -> Self {
        let source = Arc::new(StatsSource::new(transport, query));
        let poller = Poller::new(Arc::clone(&source) as Arc<dyn Source<StatsAggregate>>);
        Self { source, poller }
    }

    /// The query the next fetch will send.
    pub fn query(&self) -> StatsQuery {
        self.source.query()
    }

    /// Switches to a new window or requester and loads it right away. The
    /// previous aggregate stays visible until the new one arrives.
    pub async fn set_query(&self, query: StatsQuery) -> FetchOutcome {
        self.source.set_query(query);
        self.poller.refresh().await
    }

    /// Fetches once now.
    pub async fn load(&self) -> FetchOutcome {
        self.poller.refresh().await
    }

    /// Polls every `interval`, fetching immediately.
    pub async fn start(&self, interval: Duration) {
        self.poller.start(interval, true).await;
    }

    /// Stops periodic polling. The last aggregate stays readable.
    pub async fn stop(&self) {
        self.poller.stop().await;
    }

    /// Whether periodic polling is active.
    pub fn is_running(&self) -> bool {
        self.poller.is_running()
    }

    /// Current aggregate, loading flag and error.
    pub fn state(&self) -> PollState<StatsAggregate> {
        self.poller.state()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState<StatsAggregate>> {
        self.poller.subscribe()
    }
}
