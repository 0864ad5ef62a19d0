use super::*;

use std::{collections::VecDeque, ops::Range};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

fn page_of(range: Range<u32>, total: u64) -> Page<u32> {
    Page {
        items: range.collect(),
        total,
    }
}

/// Pops one scripted outcome per request, recording `(page, size)`.
struct ScriptedPages {
    outcomes: Mutex<VecDeque<Result<Page<u32>>>>,
    requests: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ScriptedPages {
    fn new(outcomes: Vec<Result<Page<u32>>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn requests(&self) -> Vec<(u32, u32)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PageOperation<u32> for ScriptedPages {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<u32>> {
        self.requests.lock().await.push((page, page_size));
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("script exhausted")))
    }
}

/// First request blocks until released.
struct GatedPages {
    release: Notify,
    requests: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl GatedPages {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            release: Notify::new(),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl PageOperation<u32> for GatedPages {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<u32>> {
        let first = {
            let mut requests = self.requests.lock().await;
            requests.push((page, page_size));
            requests.len() == 1
        };
        if first {
            self.release.notified().await;
        }
        Ok(page_of(0..page_size, u64::from(page_size)))
    }
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn accumulates_pages_and_tracks_completion() {
    let operation = ScriptedPages::new(vec![
        Ok(page_of(0..20, 45)),
        Ok(page_of(20..40, 45)),
        Ok(page_of(40..45, 45)),
    ]);
    let pager = Pager::new(PageConfig::default(), operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.phase, PagePhase::Idle);
    assert_eq!(snapshot.items.len(), 20);
    assert_eq!(snapshot.total, 45);
    assert_eq!(snapshot.page, 1);
    assert!(snapshot.has_more);

    pager.send(PageEvent::LoadMore).await;
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.items.len(), 40);
    assert_eq!(snapshot.page, 2);
    assert!(snapshot.has_more);

    pager.send(PageEvent::LoadMore).await;
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.items.len(), 45);
    assert_eq!(snapshot.page, 3);
    assert!(!snapshot.has_more);

    // Nothing more to load: the guard makes this a no-op.
    pager.send(PageEvent::LoadMore).await;
    settle().await;
    assert_eq!(operation.requests().await.len(), 3);
}

#[tokio::test]
async fn load_page_one_replaces_accumulated_items() {
    let operation = ScriptedPages::new(vec![
        Ok(page_of(0..20, 45)),
        Ok(page_of(20..40, 45)),
        Ok(page_of(0..20, 45)),
    ]);
    let pager = Pager::new(PageConfig::default(), operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    pager.send(PageEvent::LoadMore).await;
    settle().await;
    assert_eq!(pager.snapshot().items.len(), 40);

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.items.len(), 20);
    assert_eq!(snapshot.page, 1);
    assert_eq!(operation.requests().await, vec![(1, 20), (2, 20), (1, 20)]);
}

#[tokio::test]
async fn requests_carry_configured_page_size() {
    let operation = ScriptedPages::new(vec![Ok(page_of(0..5, 12))]);
    let pager = Pager::new(PageConfig { page_size: 5 }, operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;

    assert_eq!(operation.requests().await, vec![(1, 5)]);
    assert!(pager.snapshot().has_more);
}

#[tokio::test]
async fn load_more_is_a_no_op_while_loading() {
    let operation = GatedPages::new();
    let pager = Pager::new(PageConfig::default(), operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    assert!(pager.snapshot().is_loading());

    pager.send(PageEvent::LoadMore).await;
    pager.send(PageEvent::LoadMore).await;
    settle().await;

    operation.release.notify_one();
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.phase, PagePhase::Idle);
    assert_eq!(snapshot.items.len(), 20);
    assert_eq!(operation.requests.lock().await.len(), 1);
}

#[tokio::test]
async fn load_more_is_a_no_op_when_exhausted() {
    let operation = ScriptedPages::new(vec![Ok(page_of(0..5, 5))]);
    let pager = Pager::new(PageConfig { page_size: 5 }, operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    assert!(!pager.snapshot().has_more);

    pager.send(PageEvent::LoadMore).await;
    settle().await;
    assert_eq!(operation.requests().await.len(), 1);
}

#[tokio::test]
async fn failure_enters_error_state_and_load_page_recovers() {
    let operation = ScriptedPages::new(vec![Err(anyhow!("boom")), Ok(page_of(0..20, 45))]);
    let pager = Pager::new(PageConfig::default(), operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.phase, PagePhase::Error);
    assert_eq!(
        snapshot.error,
        Some(FetchError::Operation("boom".to_string()))
    );
    assert!(snapshot.items.is_empty());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.phase, PagePhase::Idle);
    assert_eq!(snapshot.items.len(), 20);
    assert_eq!(snapshot.error, None);
}

#[tokio::test]
async fn error_state_allows_guarded_load_more() {
    let operation = ScriptedPages::new(vec![
        Ok(page_of(0..20, 45)),
        Err(anyhow!("flaky")),
        Ok(page_of(20..40, 45)),
    ]);
    let pager = Pager::new(PageConfig::default(), operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    pager.send(PageEvent::LoadMore).await;
    settle().await;
    assert_eq!(pager.snapshot().phase, PagePhase::Error);

    // Page was not advanced by the failure, so LoadMore retries page 2.
    pager.send(PageEvent::LoadMore).await;
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.phase, PagePhase::Idle);
    assert_eq!(snapshot.items.len(), 40);
    assert_eq!(operation.requests().await, vec![(1, 20), (2, 20), (2, 20)]);
}

#[tokio::test]
async fn reset_clears_accumulation_and_reenables_loading() {
    let operation = ScriptedPages::new(vec![Ok(page_of(0..5, 5)), Ok(page_of(0..5, 5))]);
    let pager = Pager::new(PageConfig { page_size: 5 }, operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    assert!(!pager.snapshot().has_more);

    pager.send(PageEvent::Reset).await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.phase, PagePhase::Idle);
    assert!(snapshot.items.is_empty());
    assert_eq!(snapshot.total, 0);
    assert_eq!(snapshot.page, 1);
    assert!(snapshot.has_more);
    assert_eq!(snapshot.error, None);

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    assert_eq!(pager.snapshot().items.len(), 5);
}

#[tokio::test]
async fn resolution_after_reset_is_discarded() {
    let operation = GatedPages::new();
    let pager = Pager::new(PageConfig::default(), operation.clone());

    pager.send(PageEvent::LoadPage(1)).await;
    settle().await;
    pager.send(PageEvent::Reset).await;

    operation.release.notify_one();
    settle().await;
    let snapshot = pager.snapshot();
    assert_eq!(snapshot.phase, PagePhase::Idle);
    assert!(snapshot.items.is_empty());
}

#[tokio::test]
async fn load_page_zero_is_rejected() {
    let operation = ScriptedPages::new(vec![]);
    let pager = Pager::new(PageConfig::default(), operation.clone());

    pager.send(PageEvent::LoadPage(0)).await;
    settle().await;

    assert_eq!(pager.snapshot().phase, PagePhase::Idle);
    assert!(operation.requests().await.is_empty());
}
