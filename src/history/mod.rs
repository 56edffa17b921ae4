//! Paginated task-history fetcher.
//!
//! Holds the current [`HistoryQuery`] and turns it into [`HistoryPage`]s. Page
//! navigation is pure arithmetic on `{total, limit, offset}`; the fetch itself
//! goes through a [`Poller`] so superseded responses are dropped the same way
//! they are for the status poller. There is no cache: every `refetch` hits the
//! backend.
//!
//! Mutators only change the query. Call [`HistoryFetcher::refetch`] to load
//! it, or enable auto-refresh, which also refetches on every query change.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FetchResult;
use crate::model::{HistoryFilterPatch, HistoryFilters, HistoryPage, HistoryQuery, PageInfo, Task};
use crate::poller::{FetchOutcome, PollState, Poller, Source};
use crate::transport::{fetch_typed, Resource, Transport};

/// A fetched page together with the query it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryView {
    /// The query that produced `page`.
    pub query: HistoryQuery,
    /// Tasks on the page and the total across all pages.
    pub page: HistoryPage,
}

impl HistoryView {
    /// Navigation values for this page.
    pub fn page_info(&self) -> PageInfo {
        self.query.page_info(self.page.total)
    }
}

/// Loads whatever query is current when the fetch starts.
struct HistorySource {
    transport: Arc<dyn Transport>,
    query: watch::Receiver<HistoryQuery>,
}

#[async_trait]
impl Source<HistoryView> for HistorySource {
    fn name(&self) -> &str {
        "history"
    }

    async fn load(&self, _force: bool, cancel: &CancellationToken) -> FetchResult<Arc<HistoryView>> {
        let query = self.query.borrow().clone();
        let resource = Resource::History(query.clone());
        let page: HistoryPage = fetch_typed(self.transport.as_ref(), &resource, cancel).await?;
        Ok(Arc::new(HistoryView { query, page }))
    }
}

struct QueryFollower {
    /// Cancels the follower task.
    stop: CancellationToken,
    /// Handle to the follower task.
    handle: JoinHandle<()>,
}

/// Filtered, offset-paginated history with navigation helpers.
pub struct HistoryFetcher {
    /// Current query; the source reads it when a fetch starts.
    query: watch::Sender<HistoryQuery>,
    /// Runs fetches and drops superseded ones.
    poller: Arc<Poller<HistoryView>>,
    /// Refetches on query changes while auto-refresh is on.
    follower: Mutex<Option<QueryFollower>>,
}

impl HistoryFetcher {
    /// Creates a fetcher for the first page of unfiltered history.
    pub fn new(transport: Arc<dyn Transport>, limit: u32) -> Self {
        let (query, receiver) = watch::channel(HistoryQuery::new(limit));
        let source = HistorySource {
            transport,
            query: receiver,
        };
        Self {
            query,
            poller: Arc::new(Poller::new(Arc::new(source))),
            follower: Mutex::new(None),
        }
    }

    /// The query the next fetch will send.
    pub fn query(&self) -> HistoryQuery {
        self.query.borrow().clone()
    }

    /// Filters of the current query.
    pub fn filters(&self) -> HistoryFilters {
        self.query.borrow().filters.clone()
    }

    /// Merges `patch` into the filters and returns to the first page.
    pub fn set_filters(&self, patch: HistoryFilterPatch) -> HistoryQuery {
        self.update(|query| {
            query.filters.merge(patch);
            query.offset = 0;
        })
    }

    /// Replaces all filters and returns to the first page.
    pub fn replace_filters(&self, filters: HistoryFilters) -> HistoryQuery {
        self.update(|query| {
            query.filters = filters;
            query.offset = 0;
        })
    }

    /// Changes the page size. The offset stays where it is; only the derived
    /// page numbers change.
    pub fn set_limit(&self, limit: u32) -> HistoryQuery {
        self.update(|query| query.limit = limit.max(1))
    }

    /// Jumps to zero-based page `page`.
    pub fn go_to_page(&self, page: u64) -> HistoryQuery {
        self.update(|query| query.offset = page.saturating_mul(u64::from(query.limit)))
    }

    /// Moves one page forward. Moving past the last page is allowed and
    /// yields an empty page.
    pub fn next_page(&self) -> HistoryQuery {
        self.update(|query| query.offset = query.offset.saturating_add(u64::from(query.limit)))
    }

    /// Moves one page back, never below offset 0.
    pub fn prev_page(&self) -> HistoryQuery {
        self.update(|query| query.offset = query.offset.saturating_sub(u64::from(query.limit)))
    }

    /// Navigation values for the current query and the last known total.
    pub fn page_info(&self) -> PageInfo {
        let total = self
            .poller
            .state()
            .value
            .map(|view| view.page.total)
            .unwrap_or(0);
        self.query.borrow().page_info(total)
    }

    /// Loads the current query unconditionally.
    pub async fn refetch(&self) -> FetchOutcome {
        self.poller.refresh().await
    }

    /// Last page, loading flag and error.
    pub fn state(&self) -> PollState<HistoryView> {
        self.poller.state()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState<HistoryView>> {
        self.poller.subscribe()
    }

    /// Tasks of the last fetched page, empty before the first success.
    pub fn tasks(&self) -> Vec<Task> {
        self.poller
            .state()
            .value
            .map(|view| view.page.tasks.clone())
            .unwrap_or_default()
    }

    /// Refetches every `interval` and immediately on every query change.
    pub async fn start_auto_refresh(&self, interval: Duration) {
        self.stop_follower().await;
        self.poller.start(interval, false).await;

        let stop = CancellationToken::new();
        let mut changes = self.query.subscribe();
        changes.borrow_and_update();
        let poller = Arc::clone(&self.poller);
        let follower_stop = stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = follower_stop.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        changes.borrow_and_update();
                        debug!("history query changed, refetching");
                        tokio::select! {
                            biased;
                            _ = follower_stop.cancelled() => break,
                            _ = poller.refresh() => {}
                        }
                    }
                }
            }
        });
        *self.lock_follower() = Some(QueryFollower { stop, handle });
    }

    /// Stops interval and query-change refetches.
    pub async fn stop_auto_refresh(&self) {
        self.stop_follower().await;
        self.poller.stop().await;
    }

    /// Whether auto-refresh is on.
    pub fn is_auto_refreshing(&self) -> bool {
        self.poller.is_running()
    }

    fn update(&self, change: impl FnOnce(&mut HistoryQuery)) -> HistoryQuery {
        self.query.send_modify(change);
        let query = self.query();
        debug!(limit = query.limit, offset = query.offset, "history query updated");
        query
    }

    fn lock_follower(&self) -> MutexGuard<'_, Option<QueryFollower>> {
        self.follower
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn stop_follower(&self) {
        let follower = self.lock_follower().take();
        if let Some(follower) = follower {
            follower.stop.cancel();
            let _ = follower.handle.await;
        }
    }
}

impl Drop for HistoryFetcher {
    fn drop(&mut self) {
        let follower = self
            .follower
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(follower) = follower {
            follower.stop.cancel();
        }
    }
}
