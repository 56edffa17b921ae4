//! Polling scheduler.
//!
//! A [`Poller`] keeps a consumer supplied with the latest value of one
//! [`Source`] on a fixed cadence. It runs a background task that moves
//! through explicit phases:
//!
//! ```text
//! Idle --start--> Scheduled --interval elapsed--> Fetching --done--> Scheduled
//!                     ^                               |
//!                     +------- refresh (reset) -------+
//! any --stop/drop--> Stopped
//! ```
//!
//! Every fetch takes a generation number and its own cancellation token.
//! Starting a fetch cancels the previous one, and a completion only commits
//! when its generation is still the latest, so a slow response can never
//! overwrite a newer one. Failures keep the last good value and set `error`;
//! the next tick retries. Observers read state through a `watch` channel.

mod source;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchResult};

pub use source::{DirectSource, Source};

/// Smallest interval accepted by [`Poller::start`].
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

const LIFECYCLE_IDLE: u8 = 0;
const LIFECYCLE_RUNNING: u8 = 1;
const LIFECYCLE_STOPPED: u8 = 2;

/// Where the poller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Never started.
    Idle,
    /// Waiting for the next tick.
    Scheduled,
    /// A fetch is outstanding.
    Fetching,
    /// Stopped or torn down.
    Stopped,
}

/// What happened to one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result became the current value.
    Applied,
    /// The fetch failed; the previous value was kept and `error` set.
    Failed,
    /// A newer fetch replaced this one, or it was cancelled. Nothing changed.
    Superseded,
}

/// Observable state of a poller.
#[derive(Debug)]
pub struct PollState<T> {
    /// Last successfully fetched value. Never cleared by a failure.
    pub value: Option<Arc<T>>,
    /// True only during the first fetch after construction, `start` or
    /// `refresh`, and only while there is no value to show yet.
    pub loading: bool,
    /// Error from the latest completed fetch, cleared by the next success.
    pub error: Option<FetchError>,
    /// Failed fetches since the last success.
    pub consecutive_failures: u32,
    /// Monotonic time of the last success.
    pub last_updated: Option<Instant>,
    /// Wall-clock time of the last success, for display.
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Where the poller is in its cycle.
    pub phase: PollPhase,
    /// Interval of the current (or last) run; zero if never started.
    pub interval: Duration,
}

impl<T> Clone for PollState<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            loading: self.loading,
            error: self.error.clone(),
            consecutive_failures: self.consecutive_failures,
            last_updated: self.last_updated,
            last_updated_at: self.last_updated_at,
            phase: self.phase,
            interval: self.interval,
        }
    }
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            value: None,
            loading: false,
            error: None,
            consecutive_failures: 0,
            last_updated: None,
            last_updated_at: None,
            phase: PollPhase::Idle,
            interval: Duration::ZERO,
        }
    }
}

impl<T> PollState<T> {
    /// Whether the shown value may no longer reflect the backend: the last
    /// success is more than two intervals old. False before any success.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    /// [`PollState::is_stale`] evaluated at `now`.
    pub fn is_stale_at(&self, now: Instant) -> bool {
        match self.last_updated {
            Some(updated) if !self.interval.is_zero() => {
                now.saturating_duration_since(updated) > self.interval * 2
            }
            _ => false,
        }
    }

    /// "error, retrying": a failure is being shown on top of a good value.
    pub fn is_degraded(&self) -> bool {
        self.value.is_some() && self.error.is_some()
    }
}

struct RunningLoop {
    /// Cancels the background loop.
    stop: CancellationToken,
    /// Handle to the background loop task.
    handle: JoinHandle<()>,
}

struct PollerInner<T> {
    /// Where values come from.
    source: Arc<dyn Source<T>>,
    /// Published state; every change notifies subscribers.
    state: watch::Sender<PollState<T>>,
    /// Number of the newest fetch. Only that fetch may commit.
    generation: AtomicU64,
    /// Generation and token of the outstanding fetch.
    current: Mutex<Option<(u64, CancellationToken)>>,
    /// One of the `LIFECYCLE_*` constants.
    lifecycle: AtomicU8,
    /// Set by `start` and `refresh`; cleared once a fetch completes.
    first_fetch_pending: AtomicBool,
    /// Wakes the running loop so it restarts its interval.
    reschedule: Mutex<Option<Arc<Notify>>>,
}

impl<T: Send + Sync + 'static> PollerInner<T> {
    fn lock_current(&self) -> MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_reschedule(&self) -> MutexGuard<'_, Option<Arc<Notify>>> {
        self.reschedule
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resting_phase(&self) -> PollPhase {
        match self.lifecycle.load(Ordering::SeqCst) {
            LIFECYCLE_RUNNING => PollPhase::Scheduled,
            LIFECYCLE_STOPPED => PollPhase::Stopped,
            _ => PollPhase::Idle,
        }
    }

    async fn run_fetch(&self, force: bool) -> FetchOutcome {
        let token = CancellationToken::new();
        let generation = {
            let mut current = self.lock_current();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((previous, previous_token)) = current.replace((generation, token.clone())) {
                debug!(
                    source = self.source.name(),
                    generation, previous, "superseding outstanding fetch"
                );
                previous_token.cancel();
            }
            generation
        };

        let first = self.first_fetch_pending.load(Ordering::SeqCst);
        self.state.send_modify(|state| {
            state.phase = PollPhase::Fetching;
            if first && state.value.is_none() {
                state.loading = true;
            }
        });

        let result = self.source.load(force, &token).await;
        self.commit(generation, result)
    }

    fn commit(&self, generation: u64, result: FetchResult<Arc<T>>) -> FetchOutcome {
        {
            let mut current = self.lock_current();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(
                    source = self.source.name(),
                    generation, "discarding superseded result"
                );
                return FetchOutcome::Superseded;
            }
            *current = None;
            if !matches!(&result, Err(err) if err.is_cancelled()) {
                self.first_fetch_pending.store(false, Ordering::SeqCst);
            }
        }

        let resting = self.resting_phase();
        match result {
            Ok(value) => {
                self.state.send_modify(|state| {
                    state.value = Some(value);
                    state.error = None;
                    state.loading = false;
                    state.consecutive_failures = 0;
                    state.last_updated = Some(Instant::now());
                    state.last_updated_at = Some(Utc::now());
                    state.phase = resting;
                });
                FetchOutcome::Applied
            }
            Err(err) if err.is_cancelled() => {
                self.state.send_modify(|state| {
                    state.loading = false;
                    state.phase = resting;
                });
                FetchOutcome::Superseded
            }
            Err(err) => {
                warn!(
                    source = self.source.name(),
                    error = %err,
                    kind = err.label(),
                    "fetch failed, keeping last value"
                );
                self.state.send_modify(|state| {
                    state.error = Some(err);
                    state.loading = false;
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    state.phase = resting;
                });
                FetchOutcome::Failed
            }
        }
    }

    /// Cancels the outstanding fetch and parks the poller in `Stopped`.
    fn finish(&self) {
        self.lifecycle.store(LIFECYCLE_STOPPED, Ordering::SeqCst);
        self.lock_reschedule().take();
        let outstanding = {
            let mut current = self.lock_current();
            // late results from before the stop must not commit
            self.generation.fetch_add(1, Ordering::SeqCst);
            current.take()
        };
        if let Some((_, token)) = outstanding {
            token.cancel();
        }
        self.state.send_modify(|state| {
            state.loading = false;
            state.phase = PollPhase::Stopped;
        });
    }
}

async fn run_loop<T: Send + Sync + 'static>(
    inner: Arc<PollerInner<T>>,
    interval: Duration,
    immediate: bool,
    stop: CancellationToken,
    reschedule: Arc<Notify>,
) {
    let mut delay = if immediate { Duration::ZERO } else { interval };
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = reschedule.notified() => {
                debug!(source = inner.source.name(), "schedule reset");
                delay = interval;
                continue;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            outcome = inner.run_fetch(false) => {
                debug!(source = inner.source.name(), ?outcome, "tick finished");
            }
        }
        // measured from the end of this tick, so slow fetches never overlap
        delay = interval;
    }
    inner.finish();
}

/// Periodic, cancellable fetcher for one source.
///
/// Dropping the poller cancels its background task and any outstanding fetch.
pub struct Poller<T> {
    /// State shared with the background loop.
    inner: Arc<PollerInner<T>>,
    /// The background loop, while started.
    running: Mutex<Option<RunningLoop>>,
}

impl<T: Send + Sync + 'static> Poller<T> {
    /// Creates an idle poller. Nothing is fetched until [`Poller::start`],
    /// [`Poller::refresh`] or [`Poller::fetch_once`] is called.
    ///
    /// # Arguments
    ///
    /// * `source` - Where values come from; a [`ResourceCache`](crate::cache::ResourceCache)
    ///   for cached resources or a [`DirectSource`] for uncached ones
    pub fn new(source: Arc<dyn Source<T>>) -> Self {
        let (state, _) = watch::channel(PollState::default());
        Self {
            inner: Arc::new(PollerInner {
                source,
                state,
                generation: AtomicU64::new(0),
                current: Mutex::new(None),
                lifecycle: AtomicU8::new(LIFECYCLE_IDLE),
                first_fetch_pending: AtomicBool::new(true),
                reschedule: Mutex::new(None),
            }),
            running: Mutex::new(None),
        }
    }

    /// Starts polling every `interval`, restarting if already running.
    ///
    /// With `immediate` the first fetch happens now; otherwise after one
    /// interval. Intervals below [`MIN_INTERVAL`] are raised to it.
    pub async fn start(&self, interval: Duration, immediate: bool) {
        self.stop_loop().await;

        let interval = interval.max(MIN_INTERVAL);
        let stop = CancellationToken::new();
        let reschedule = Arc::new(Notify::new());
        *self.inner.lock_reschedule() = Some(Arc::clone(&reschedule));
        self.inner.lifecycle.store(LIFECYCLE_RUNNING, Ordering::SeqCst);
        self.inner.first_fetch_pending.store(true, Ordering::SeqCst);
        self.inner.state.send_modify(|state| {
            state.interval = interval;
            if state.phase != PollPhase::Fetching {
                state.phase = PollPhase::Scheduled;
            }
        });

        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            interval,
            immediate,
            stop.clone(),
            reschedule,
        ));
        *self.lock_running() = Some(RunningLoop { stop, handle });

        info!(
            source = self.inner.source.name(),
            interval_ms = interval.as_millis() as u64,
            immediate,
            "poller started"
        );
    }

    /// Stops polling and discards any outstanding fetch.
    pub async fn stop(&self) {
        if self.stop_loop().await {
            info!(source = self.inner.source.name(), "poller stopped");
        }
        if self.inner.lifecycle.load(Ordering::SeqCst) != LIFECYCLE_IDLE {
            self.inner.finish();
        }
    }

    /// Forces a fetch now, superseding any outstanding one, and restarts the
    /// interval from its completion.
    pub async fn refresh(&self) -> FetchOutcome {
        self.inner.first_fetch_pending.store(true, Ordering::SeqCst);
        let outcome = self.inner.run_fetch(true).await;
        if let Some(reschedule) = self.inner.lock_reschedule().as_ref() {
            reschedule.notify_one();
        }
        outcome
    }

    /// One unforced fetch without touching the schedule. Works whether or not
    /// the poller is running.
    pub async fn fetch_once(&self) -> FetchOutcome {
        self.inner.run_fetch(false).await
    }

    /// Current state.
    pub fn state(&self) -> PollState<T> {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.inner.state.subscribe()
    }

    /// Whether the background loop is running.
    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    /// Name of the source, as used in logs.
    pub fn source_name(&self) -> &str {
        self.inner.source.name()
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancels the background task and waits for it. Returns whether one ran.
    async fn stop_loop(&self) -> bool {
        let running = self.lock_running().take();
        match running {
            Some(running) => {
                running.stop.cancel();
                let _ = running.handle.await;
                true
            }
            None => false,
        }
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(running) = running {
            running.stop.cancel();
        }
        let current = self
            .inner
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some((_, token)) = current {
            token.cancel();
        }
    }
}
