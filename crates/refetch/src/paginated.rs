use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::{
    error::FetchError,
    operation::{Page, PageOperation},
};

/// Construction-time configuration for a [`Pager`].
#[derive(Debug, Clone)]
pub struct PageConfig {
    /// Fixed page length passed to the operation. Must be positive.
    pub page_size: u32,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagePhase {
    Idle,
    Loading,
    Error,
}

/// External events accepted by [`Pager::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Load a specific 1-based page. Page 1 replaces the accumulated
    /// items (fresh query); any other page appends to them.
    LoadPage(u32),
    /// Load the page after the current one. No-op unless more items
    /// remain and nothing is in flight.
    LoadMore,
    /// Return state and context to their construction-time values.
    Reset,
}

/// Read-only view of pager state after a completed transition.
#[derive(Debug, Clone)]
pub struct PageSnapshot<T> {
    pub phase: PagePhase,
    /// Items accumulated across successful page loads, in page order.
    pub items: Vec<T>,
    /// Server-reported total as of the most recent successful load.
    pub total: u64,
    /// 1-based page number of the most recent successful load.
    pub page: u32,
    pub has_more: bool,
    pub error: Option<FetchError>,
}

impl<T> PageSnapshot<T> {
    fn initial() -> Self {
        Self {
            phase: PagePhase::Idle,
            items: Vec::new(),
            total: 0,
            page: 1,
            has_more: true,
            error: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == PagePhase::Loading
    }
}

struct PagerInner<T> {
    phase: PagePhase,
    items: Vec<T>,
    total: u64,
    page: u32,
    has_more: bool,
    error: Option<FetchError>,
    /// Attempt token distinguishing in-flight page requests; stale
    /// resolutions fail the token check and are discarded.
    attempt: u64,
}

/// Paginated-fetch controller: accumulates items page by page from a
/// caller-supplied page operation and tracks whether more remain.
///
/// Only one page request is ever in flight: `LoadMore` is guarded
/// while loading, and `LoadPage` supersedes by orphaning the pending
/// request's token.
pub struct Pager<T> {
    config: PageConfig,
    operation: Arc<dyn PageOperation<T>>,
    inner: Mutex<PagerInner<T>>,
    updates: watch::Sender<PageSnapshot<T>>,
}

impl<T: Clone + Send + Sync + 'static> Pager<T> {
    pub fn new(config: PageConfig, operation: Arc<dyn PageOperation<T>>) -> Arc<Self> {
        debug_assert!(config.page_size > 0, "page size must be positive");
        let (updates, _) = watch::channel(PageSnapshot::initial());
        Arc::new(Self {
            config,
            operation,
            inner: Mutex::new(PagerInner {
                phase: PagePhase::Idle,
                items: Vec::new(),
                total: 0,
                page: 1,
                has_more: true,
                error: None,
                attempt: 0,
            }),
            updates,
        })
    }

    /// Current state and context.
    pub fn snapshot(&self) -> PageSnapshot<T> {
        self.updates.borrow().clone()
    }

    /// Receives a fresh snapshot after every completed transition.
    pub fn subscribe(&self) -> watch::Receiver<PageSnapshot<T>> {
        self.updates.subscribe()
    }

    pub async fn send(self: &Arc<Self>, event: PageEvent) {
        match event {
            PageEvent::LoadPage(page) => self.on_load_page(page).await,
            PageEvent::LoadMore => self.on_load_more().await,
            PageEvent::Reset => self.on_reset().await,
        }
    }

    async fn on_load_page(self: &Arc<Self>, page: u32) {
        if page == 0 {
            warn!("ignoring LOAD_PAGE(0); pages are 1-based");
            return;
        }
        let mut guard = self.inner.lock().await;
        self.start_loading(&mut guard, page);
    }

    async fn on_load_more(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        if guard.phase == PagePhase::Loading || !guard.has_more {
            debug!(
                phase = ?guard.phase,
                has_more = guard.has_more,
                "ignoring LOAD_MORE"
            );
            return;
        }
        let next = guard.page + 1;
        self.start_loading(&mut guard, next);
    }

    fn start_loading(self: &Arc<Self>, guard: &mut PagerInner<T>, target: u32) {
        guard.attempt = guard.attempt.wrapping_add(1);
        let token = guard.attempt;
        guard.phase = PagePhase::Loading;
        self.publish(guard);

        let this = Arc::clone(self);
        let operation = Arc::clone(&self.operation);
        let page_size = self.config.page_size;
        tokio::spawn(async move {
            let outcome = operation.fetch_page(target, page_size).await;
            this.on_settled(token, target, outcome).await;
        });
    }

    async fn on_settled(self: &Arc<Self>, token: u64, target: u32, outcome: anyhow::Result<Page<T>>) {
        let mut guard = self.inner.lock().await;
        if guard.attempt != token || guard.phase != PagePhase::Loading {
            debug!(token, target, "discarding stale page resolution");
            return;
        }
        match outcome {
            Ok(page) => {
                if target == 1 {
                    // Fresh query: page 1 discards prior accumulation.
                    guard.items = page.items;
                } else {
                    guard.items.extend(page.items);
                }
                guard.total = page.total;
                guard.page = target;
                guard.has_more = (guard.items.len() as u64) < guard.total;
                guard.error = None;
                guard.phase = PagePhase::Idle;
                debug!(
                    page = target,
                    accumulated = guard.items.len(),
                    total = guard.total,
                    has_more = guard.has_more,
                    "page loaded"
                );
                self.publish(&guard);
            }
            Err(err) => {
                warn!(page = target, error = %err, "page load failed");
                guard.error = Some(FetchError::Operation(err.to_string()));
                guard.phase = PagePhase::Error;
                self.publish(&guard);
            }
        }
    }

    async fn on_reset(self: &Arc<Self>) {
        let mut guard = self.inner.lock().await;
        guard.attempt = guard.attempt.wrapping_add(1);
        guard.phase = PagePhase::Idle;
        guard.items.clear();
        guard.total = 0;
        guard.page = 1;
        guard.has_more = true;
        guard.error = None;
        self.publish(&guard);
    }

    fn publish(&self, inner: &PagerInner<T>) {
        self.updates.send_replace(PageSnapshot {
            phase: inner.phase,
            items: inner.items.clone(),
            total: inner.total,
            page: inner.page,
            has_more: inner.has_more,
            error: inner.error.clone(),
        });
    }
}

#[cfg(test)]
#[path = "tests/paginated_tests.rs"]
mod tests;
