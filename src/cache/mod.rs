//! Time-boxed reuse and request coalescing for a single named resource.
//!
//! A [`ResourceCache`] owns the last successful value of one resource and at
//! most one outstanding fetch for it. Callers that arrive while a fetch is
//! running share its result; callers that arrive within the TTL of the last
//! success get the cached value without touching the network.
//!
//! # Force semantics
//!
//! An outstanding fetch always wins. `force` only skips the TTL check: when a
//! fetch is already running, forced and unforced callers alike join it, so
//! there is never more than one request in flight for the resource.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use queuewatch::cache::ResourceCache;
//! use queuewatch::transport::{HttpTransport, Resource};
//! use queuewatch::model::QueueSnapshot;
//!
//! let transport = Arc::new(HttpTransport::new("http://localhost:3000/api/queue", Duration::from_secs(15))?);
//! let cache: ResourceCache<QueueSnapshot> =
//!     ResourceCache::new(transport, Resource::Status, Duration::from_secs(5));
//!
//! let snapshot = cache.get(false).await?;   // network
//! let again = cache.get(false).await?;      // cached, same Arc
//! let fresh = cache.get(true).await?;       // network again
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::poller::Source;
use crate::transport::{fetch_typed, Payload, Resource, Transport};

type SharedFetch<T> = Shared<BoxFuture<'static, FetchResult<Arc<T>>>>;

#[derive(Debug)]
struct CachedValue<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

struct CacheState<T> {
    /// Last successful value and when it arrived.
    last: Option<CachedValue<T>>,
    /// Fetch that concurrent callers join.
    in_flight: Option<SharedFetch<T>>,
    /// Bumped by `reset`; fetches started under an older epoch never commit.
    epoch: u64,
}

/// TTL cache and request coalescer for one resource.
///
/// Cloning yields another handle to the same cache. The cache is an explicit
/// object: construct one per resource and hand it to whoever needs it.
pub struct ResourceCache<T> {
    /// Network boundary used for every fetch.
    transport: Arc<dyn Transport>,
    /// The one resource this cache holds.
    resource: Resource,
    /// How long a successful value is reused.
    ttl: Duration,
    /// Last value and outstanding fetch, shared by all clones.
    state: Arc<Mutex<CacheState<T>>>,
    /// Parent of every fetch token; cancelled by `shutdown`.
    shutdown: CancellationToken,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            resource: self.resource.clone(),
            ttl: self.ttl,
            state: Arc::clone(&self.state),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<T: Payload> ResourceCache<T> {
    /// Creates an empty cache for `resource`.
    ///
    /// # Arguments
    ///
    /// * `transport` - Network boundary used for every fetch
    /// * `resource` - The resource to cache, usually [`Resource::Status`]
    /// * `ttl` - How long a successful value is reused without a new request
    pub fn new(transport: Arc<dyn Transport>, resource: Resource, ttl: Duration) -> Self {
        Self {
            transport,
            resource,
            ttl,
            state: Arc::new(Mutex::new(CacheState {
                last: None,
                in_flight: None,
                epoch: 0,
            })),
            shutdown: CancellationToken::new(),
        }
    }

    /// How long a successful value is reused.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The resource this cache holds.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Returns the resource value, reusing or coalescing where possible.
    ///
    /// - not forced and cached within the TTL: the cached value, no request
    /// - a fetch already outstanding: that fetch's result
    /// - otherwise: a new request, which becomes the outstanding fetch
    ///
    /// Failures are not cached; the next call tries again.
    pub async fn get(&self, force: bool) -> FetchResult<Arc<T>> {
        let fetch = {
            let mut state = self.lock();
            if !force {
                if let Some(cached) = &state.last {
                    if cached.fetched_at.elapsed() < self.ttl {
                        debug!(resource = self.resource.path(), "cache hit");
                        return Ok(Arc::clone(&cached.value));
                    }
                }
            }
            match &state.in_flight {
                Some(fetch) => {
                    debug!(
                        resource = self.resource.path(),
                        force, "joining outstanding fetch"
                    );
                    fetch.clone()
                }
                None => self.start_fetch(&mut state),
            }
        };
        fetch.await
    }

    /// Like [`ResourceCache::get`], but stops waiting when `cancel` fires.
    ///
    /// Only this caller gives up; the shared fetch keeps running for everyone
    /// else and still populates the cache.
    pub async fn get_with_cancel(
        &self,
        force: bool,
        cancel: &CancellationToken,
    ) -> FetchResult<Arc<T>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.get(force) => result,
        }
    }

    /// The cached value regardless of age, if any.
    pub fn cached(&self) -> Option<Arc<T>> {
        self.lock().last.as_ref().map(|cached| Arc::clone(&cached.value))
    }

    /// Age of the cached value.
    pub fn age(&self) -> Option<Duration> {
        self.lock()
            .last
            .as_ref()
            .map(|cached| cached.fetched_at.elapsed())
    }

    /// Whether a fetch is outstanding.
    pub fn is_fetching(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Drops the cached value. An outstanding fetch is left alone and
    /// repopulates the cache when it completes.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.last = None;
        debug!(resource = self.resource.path(), "cache invalidated");
    }

    /// Returns the cache to its freshly constructed state. A fetch started
    /// before the reset may still finish, but its result is not stored.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.last = None;
        state.in_flight = None;
        state.epoch = state.epoch.wrapping_add(1);
        debug!(resource = self.resource.path(), "cache reset");
    }

    /// Cancels any outstanding fetch. Used at application teardown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.reset();
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns the network call and records it as the outstanding fetch.
    ///
    /// Must be called with the state lock held: the spawned task needs the
    /// same lock to commit, so it cannot finish before `in_flight` is set.
    fn start_fetch(&self, state: &mut CacheState<T>) -> SharedFetch<T> {
        let epoch = state.epoch;
        let token = self.shutdown.child_token();
        let transport = Arc::clone(&self.transport);
        let resource = self.resource.clone();
        let shared_state = Arc::clone(&self.state);

        debug!(resource = resource.path(), "starting fetch");
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let result = fetch_typed::<T>(transport.as_ref(), &resource, &token)
                .await
                .map(Arc::new);

            let mut state = shared_state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if state.epoch == epoch {
                state.in_flight = None;
                if let Ok(value) = &result {
                    state.last = Some(CachedValue {
                        value: Arc::clone(value),
                        fetched_at: Instant::now(),
                    });
                }
            }
            debug!(
                resource = resource.path(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "fetch finished"
            );
            result
        });

        let fetch = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(FetchError::Cancelled),
                Err(err) => Err(FetchError::Network(format!("fetch task failed: {}", err))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(fetch.clone());
        fetch
    }
}

#[async_trait]
impl<T: Payload> Source<T> for ResourceCache<T> {
    fn name(&self) -> &str {
        self.resource.path()
    }

    async fn load(&self, force: bool, cancel: &CancellationToken) -> FetchResult<Arc<T>> {
        self.get_with_cancel(force, cancel).await
    }
}
