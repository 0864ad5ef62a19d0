use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{sleep, Instant},
};
use tracing::{debug, warn};

use crate::{
    backoff::retry_delay,
    cache::{CacheEntry, CacheStore, MemoryCache},
    error::FetchError,
    operation::FetchOperation,
};

/// Construction-time configuration for a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum number of automatic retries after a failed attempt.
    pub retry_count: u32,
    /// Base delay for linear backoff between retries.
    pub retry_delay: Duration,
    /// Cache validity window. Zero disables caching.
    pub cache_window: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_count: 0,
            retry_delay: Duration::from_millis(1000),
            cache_window: Duration::ZERO,
        }
    }
}

/// Where the controller currently is in the fetch lifecycle.
///
/// `CheckingCache` is a pass-through decision state: it is entered and
/// resolved within the same `send(Fetch)` call, so callers polling
/// [`Fetcher::snapshot`] observe it only through the update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPhase {
    Idle,
    CheckingCache,
    Cached,
    Loading,
    Retrying,
    Success,
    Error,
}

/// External events accepted by [`Fetcher::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEvent {
    /// Start a fetch, consulting the cache first when caching is on.
    Fetch,
    /// From the error state, clear the retry count and load again.
    Retry,
    /// Abandon the in-flight attempt or pending retry, keeping context.
    Cancel,
    /// Return state and context to their construction-time values.
    Reset,
}

/// Read-only view of controller state after a completed transition.
#[derive(Debug, Clone)]
pub struct FetchSnapshot<T> {
    pub phase: FetchPhase,
    /// Last successfully retrieved value. A later failure does not
    /// erase it; only `Reset` does.
    pub data: Option<T>,
    pub error: Option<FetchError>,
    /// Consecutive failed attempts since the last success or reset.
    pub retries: u32,
}

impl<T> FetchSnapshot<T> {
    fn initial() -> Self {
        Self {
            phase: FetchPhase::Idle,
            data: None,
            error: None,
            retries: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, FetchPhase::Loading | FetchPhase::Retrying)
    }
}

struct FetchInner<T> {
    phase: FetchPhase,
    data: Option<T>,
    error: Option<FetchError>,
    retries: u32,
    /// Attempt token: bumped for every dispatched operation and on any
    /// transition that must orphan an in-flight resolution or timer.
    attempt: u64,
    retry_timer: Option<JoinHandle<()>>,
}

impl<T> FetchInner<T> {
    fn abort_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }
}

/// Single-fetch controller: owns one logical resource value and
/// mediates between a cache, a remote fetch operation, and a bounded
/// retry path.
///
/// Events are processed one at a time to completion; the operation is
/// the only suspension point, and its resolution re-enters the
/// controller tagged with the attempt token that dispatched it. A
/// resolution whose token no longer matches is discarded, which is
/// what makes `Cancel`, `Reset`, and superseding `Fetch` safe against
/// late transport results.
pub struct Fetcher<T> {
    config: FetchConfig,
    operation: Arc<dyn FetchOperation<T>>,
    cache: Arc<dyn CacheStore<T>>,
    inner: Mutex<FetchInner<T>>,
    updates: watch::Sender<FetchSnapshot<T>>,
}

impl<T: Clone + Send + Sync + 'static> Fetcher<T> {
    pub fn new(config: FetchConfig, operation: Arc<dyn FetchOperation<T>>) -> Arc<Self> {
        Self::with_cache_store(config, operation, Arc::new(MemoryCache::default()))
    }

    pub fn with_cache_store(
        config: FetchConfig,
        operation: Arc<dyn FetchOperation<T>>,
        cache: Arc<dyn CacheStore<T>>,
    ) -> Arc<Self> {
        let (updates, _) = watch::channel(FetchSnapshot::initial());
        Arc::new(Self {
            config,
            operation,
            cache,
            inner: Mutex::new(FetchInner {
                phase: FetchPhase::Idle,
                data: None,
                error: None,
                retries: 0,
                attempt: 0,
                retry_timer: None,
            }),
            updates,
        })
    }

    /// Current state and context.
    pub fn snapshot(&self) -> FetchSnapshot<T> {
        self.updates.borrow().clone()
    }

    /// Receives a fresh snapshot after every completed transition.
    pub fn subscribe(&self) -> watch::Receiver<FetchSnapshot<T>> {
        self.updates.subscribe()
    }

    pub async fn send(self: &Arc<Self>, event: FetchEvent) {
        match event {
            FetchEvent::Fetch => self.on_fetch().await,
            FetchEvent::Retry => self.on_retry().await,
            FetchEvent::Cancel => self.on_cancel().await,
            FetchEvent::Reset => self.on_reset().await,
        }
    }

    async fn on_fetch(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        // A new fetch supersedes whatever is pending: the timer is
        // aborted here and any in-flight operation is orphaned by the
        // token bump in start_loading.
        guard.abort_retry_timer();
        guard.retries = 0;
        match guard.phase {
            FetchPhase::Cached => {
                // Fetch from `cached` forces revalidation.
                if let Err(err) = self.cache.invalidate().await {
                    warn!(error = %err, "cache invalidation failed");
                }
                self.start_loading(&mut guard);
            }
            FetchPhase::Error => self.start_loading(&mut guard),
            _ => self.check_cache_then_load(&mut guard).await,
        }
    }

    async fn check_cache_then_load(self: &Arc<Self>, guard: &mut FetchInner<T>) {
        if self.config.cache_window.is_zero() {
            self.start_loading(guard);
            return;
        }
        guard.phase = FetchPhase::CheckingCache;
        self.publish(guard);
        match self.cache.load().await {
            Ok(Some(entry)) if entry.is_fresh(self.config.cache_window, Instant::now()) => {
                debug!("cache hit; serving cached value");
                guard.data = Some(entry.data);
                guard.error = None;
                guard.phase = FetchPhase::Cached;
                self.publish(guard);
            }
            Ok(Some(_)) => {
                debug!("cache entry expired; fetching fresh");
                self.start_loading(guard);
            }
            Ok(None) => {
                debug!("cache miss; fetching");
                self.start_loading(guard);
            }
            Err(err) => {
                let err = FetchError::CacheRead(err.to_string());
                warn!(error = %err, "treating cache read failure as a miss");
                self.start_loading(guard);
            }
        }
    }

    fn start_loading(self: &Arc<Self>, guard: &mut FetchInner<T>) {
        guard.attempt = guard.attempt.wrapping_add(1);
        let token = guard.attempt;
        guard.phase = FetchPhase::Loading;
        self.publish(guard);

        let this = Arc::clone(self);
        let operation = Arc::clone(&self.operation);
        tokio::spawn(async move {
            let outcome = operation.fetch().await;
            this.on_settled(token, outcome).await;
        });
    }

    async fn on_settled(self: &Arc<Self>, token: u64, outcome: anyhow::Result<T>) {
        let mut guard = self.inner.lock().await;
        if guard.attempt != token || guard.phase != FetchPhase::Loading {
            debug!(token, "discarding stale fetch resolution");
            return;
        }
        match outcome {
            Ok(value) => {
                if !self.config.cache_window.is_zero() {
                    let entry = CacheEntry {
                        data: value.clone(),
                        stored_at: Instant::now(),
                    };
                    if let Err(err) = self.cache.store(entry).await {
                        warn!(error = %err, "failed to store cache entry");
                    }
                }
                guard.data = Some(value);
                guard.error = None;
                guard.retries = 0;
                guard.phase = FetchPhase::Success;
                self.publish(&guard);
            }
            Err(err) => {
                if guard.retries < self.config.retry_count {
                    guard.retries += 1;
                    let delay = retry_delay(self.config.retry_delay, guard.retries);
                    debug!(
                        attempt = guard.retries,
                        max_attempts = self.config.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed; retry scheduled"
                    );
                    guard.phase = FetchPhase::Retrying;
                    self.publish(&guard);

                    let this = Arc::clone(self);
                    let timer_token = guard.attempt;
                    guard.retry_timer = Some(tokio::spawn(async move {
                        sleep(delay).await;
                        this.on_retry_elapsed(timer_token).await;
                    }));
                } else {
                    let attempts = guard.retries + 1;
                    warn!(attempts, "fetch failed; retries exhausted");
                    guard.error = Some(if self.config.retry_count == 0 {
                        FetchError::Operation(err.to_string())
                    } else {
                        FetchError::RetryExhausted {
                            attempts,
                            last: err.to_string(),
                        }
                    });
                    guard.retries = 0;
                    guard.phase = FetchPhase::Error;
                    self.publish(&guard);
                }
            }
        }
    }

    async fn on_retry_elapsed(self: &Arc<Self>, token: u64) {
        let mut guard = self.inner.lock().await;
        if guard.attempt != token || guard.phase != FetchPhase::Retrying {
            debug!(token, "retry timer fired after state moved on; ignoring");
            return;
        }
        guard.retry_timer = None;
        self.start_loading(&mut guard);
    }

    async fn on_retry(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        if guard.phase != FetchPhase::Error {
            debug!(phase = ?guard.phase, "ignoring RETRY outside error state");
            return;
        }
        guard.retries = 0;
        self.start_loading(&mut guard);
    }

    async fn on_cancel(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        match guard.phase {
            FetchPhase::Loading | FetchPhase::Retrying => {
                guard.abort_retry_timer();
                // Orphan the in-flight operation; its resolution will
                // fail the token check and be discarded.
                guard.attempt = guard.attempt.wrapping_add(1);
                guard.phase = FetchPhase::Idle;
                self.publish(&guard);
            }
            _ => debug!(phase = ?guard.phase, "ignoring CANCEL with nothing in flight"),
        }
    }

    async fn on_reset(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        guard.abort_retry_timer();
        guard.attempt = guard.attempt.wrapping_add(1);
        guard.phase = FetchPhase::Idle;
        guard.data = None;
        guard.error = None;
        guard.retries = 0;
        if let Err(err) = self.cache.invalidate().await {
            warn!(error = %err, "cache invalidation failed during reset");
        }
        self.publish(&guard);
    }

    fn publish(&self, inner: &FetchInner<T>) {
        self.updates.send_replace(FetchSnapshot {
            phase: inner.phase,
            data: inner.data.clone(),
            error: inner.error.clone(),
            retries: inner.retries,
        });
    }
}

#[cfg(test)]
#[path = "tests/single_tests.rs"]
mod tests;
