//! Wiring for the three live panels: status, history and statistics.
//!
//! One [`Dashboard`] owns a single transport, the process-wide status cache,
//! the status poller reading through that cache, the history fetcher and the
//! statistics fetcher. Panels read state from it; dropping it tears
//! everything down.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::cache::ResourceCache;
use crate::config::{ConfigError, WatchConfig};
use crate::error::{FetchError, FetchResult};
use crate::history::HistoryFetcher;
use crate::model::{QueueSnapshot, StatsQuery};
use crate::poller::{FetchOutcome, PollState, Poller, Source};
use crate::stats::StatsFetcher;
use crate::transport::{HttpTransport, Resource, Transport};

/// Errors raised while building a dashboard.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create HTTP transport: {0}")]
    Transport(#[from] FetchError),
}

/// The status, history and statistics panels behind one handle.
///
/// # Example
///
/// ```ignore
/// let dashboard = Dashboard::new(WatchConfig::load(None)?)?;
/// dashboard.start().await;
///
/// let mut status = dashboard.subscribe_status();
/// status.changed().await?;
/// println!("{:?}", status.borrow().value);
///
/// dashboard.stop().await;
/// ```
pub struct Dashboard {
    /// Validated settings the panels were built from.
    config: WatchConfig,
    /// Process-wide status cache, shared with the status poller.
    status_cache: ResourceCache<QueueSnapshot>,
    /// Periodic status refresh through `status_cache`.
    status: Poller<QueueSnapshot>,
    /// Paginated history panel.
    history: HistoryFetcher,
    /// Aggregate statistics panel.
    stats: StatsFetcher,
}

impl Dashboard {
    /// Validates `config` and connects over HTTP.
    pub fn new(config: WatchConfig) -> Result<Self, DashboardError> {
        config.validate()?;
        let transport = HttpTransport::new(config.base_url.clone(), config.request_timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Builds the panels on top of an existing transport. `config` is not
    /// validated here; intervals below the poller minimum are raised to it.
    ///
    /// # Arguments
    ///
    /// * `config` - TTL, intervals and history page size
    /// * `transport` - Network boundary shared by every panel
    pub fn with_transport(config: WatchConfig, transport: Arc<dyn Transport>) -> Self {
        let status_cache = ResourceCache::new(
            Arc::clone(&transport),
            Resource::Status,
            config.status_ttl(),
        );
        let status = Poller::new(Arc::new(status_cache.clone()) as Arc<dyn Source<QueueSnapshot>>);
        let history = HistoryFetcher::new(Arc::clone(&transport), config.history_limit);
        let stats = StatsFetcher::new(transport, StatsQuery::new());

        Self {
            config,
            status_cache,
            status,
            history,
            stats,
        }
    }

    /// Starts every periodic task the configuration asks for.
    pub async fn start(&self) {
        self.status
            .start(self.config.status_poll_interval(), true)
            .await;
        self.stats.start(self.config.stats_poll_interval()).await;
        if let Some(interval) = self.config.history_refresh_interval() {
            self.history.start_auto_refresh(interval).await;
        }
        info!(base_url = %self.config.base_url, "dashboard started");
    }

    /// Stops all periodic work and cancels anything in flight.
    pub async fn stop(&self) {
        self.status.stop().await;
        self.stats.stop().await;
        self.history.stop_auto_refresh().await;
        info!("dashboard stopped");
    }

    /// Fetches history once so the first page is on screen before the
    /// first auto-refresh tick.
    pub async fn load_history(&self) -> FetchOutcome {
        self.history.refetch().await
    }

    /// Current status snapshot through the shared cache. Callers arriving
    /// while a fetch is outstanding share it.
    pub async fn snapshot(&self, force: bool) -> FetchResult<Arc<QueueSnapshot>> {
        self.status_cache.get(force).await
    }

    /// Forces a status refresh and resets the poll schedule.
    pub async fn refresh_status(&self) -> FetchOutcome {
        self.status.refresh().await
    }

    /// Current status value, loading flag, error and staleness inputs.
    pub fn status_state(&self) -> PollState<QueueSnapshot> {
        self.status.state()
    }

    /// Receiver notified on every status state change.
    pub fn subscribe_status(&self) -> watch::Receiver<PollState<QueueSnapshot>> {
        self.status.subscribe()
    }

    /// The shared status cache.
    pub fn status_cache(&self) -> &ResourceCache<QueueSnapshot> {
        &self.status_cache
    }

    /// The status poller, for callers that drive it directly.
    pub fn status_poller(&self) -> &Poller<QueueSnapshot> {
        &self.status
    }

    /// The history panel.
    pub fn history(&self) -> &HistoryFetcher {
        &self.history
    }

    /// The statistics panel.
    pub fn stats(&self) -> &StatsFetcher {
        &self.stats
    }

    /// Settings the dashboard was built from.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.status_cache.shutdown();
    }
}
