use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

/// A cached value together with the time it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub stored_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Whether this entry is still inside the validity window at `now`.
    ///
    /// A zero window disables caching entirely, so nothing is ever
    /// fresh. An entry outside the window is treated as absent by the
    /// controller and triggers a fresh fetch.
    pub fn is_fresh(&self, window: Duration, now: Instant) -> bool {
        !window.is_zero() && now.duration_since(self.stored_at) < window
    }
}

/// Storage seam for the single-fetch cache.
///
/// The in-memory default suffices for most callers; persistent
/// backends implement this to survive the owning session. Read
/// failures are downgraded to cache misses by the controller, never
/// surfaced as terminal errors.
#[async_trait]
pub trait CacheStore<T>: Send + Sync {
    async fn load(&self) -> Result<Option<CacheEntry<T>>>;
    async fn store(&self, entry: CacheEntry<T>) -> Result<()>;
    async fn invalidate(&self) -> Result<()>;
}

/// Single-slot in-memory cache store.
pub struct MemoryCache<T> {
    slot: Mutex<Option<CacheEntry<T>>>,
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> CacheStore<T> for MemoryCache<T> {
    async fn load(&self) -> Result<Option<CacheEntry<T>>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn store(&self, entry: CacheEntry<T>) -> Result<()> {
        *self.slot.lock().await = Some(entry);
        Ok(())
    }

    async fn invalidate(&self) -> Result<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}
