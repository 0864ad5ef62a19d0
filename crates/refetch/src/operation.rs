use std::{future::Future, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// A single remote-fetch operation supplied by the caller.
///
/// Must not panic; any failure path surfaces as an `Err`. The
/// controller decides when this runs and what happens with the
/// outcome, including discarding it after a cancel or reset.
#[async_trait]
pub trait FetchOperation<T>: Send + Sync {
    async fn fetch(&self) -> Result<T>;
}

/// One page of a paginated result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Server-reported total element count for the query. Authoritative
    /// for deciding whether more pages remain.
    pub total: u64,
}

/// A page-parameterized remote-fetch operation.
///
/// `page` is 1-based; `page_size` is the configured fixed page length.
#[async_trait]
pub trait PageOperation<T>: Send + Sync {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<T>>;
}

struct FnOperation<T> {
    f: Box<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>,
}

#[async_trait]
impl<T: Send> FetchOperation<T> for FnOperation<T> {
    async fn fetch(&self) -> Result<T> {
        (self.f)().await
    }
}

struct FnPageOperation<T> {
    f: Box<dyn Fn(u32, u32) -> BoxFuture<'static, Result<Page<T>>> + Send + Sync>,
}

#[async_trait]
impl<T: Send> PageOperation<T> for FnPageOperation<T> {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<Page<T>> {
        (self.f)(page, page_size).await
    }
}

/// Wraps an async closure as a [`FetchOperation`].
pub fn fetch_fn<T, F, Fut>(f: F) -> Arc<dyn FetchOperation<T>>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(FnOperation {
        f: Box::new(move || -> BoxFuture<'static, Result<T>> { Box::pin(f()) }),
    })
}

/// Wraps an async closure as a [`PageOperation`].
pub fn page_fn<T, F, Fut>(f: F) -> Arc<dyn PageOperation<T>>
where
    T: Send + 'static,
    F: Fn(u32, u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Page<T>>> + Send + 'static,
{
    Arc::new(FnPageOperation {
        f: Box::new(move |page, page_size| -> BoxFuture<'static, Result<Page<T>>> {
            Box::pin(f(page, page_size))
        }),
    })
}
