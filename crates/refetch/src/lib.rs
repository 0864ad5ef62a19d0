//! Asynchronous resource-fetch controllers.
//!
//! Two controllers orchestrate *when* a caller-supplied async operation
//! runs and what happens with its outcome; neither performs I/O itself.
//! [`Fetcher`] drives a single value through cache check, load, bounded
//! retry with linear backoff, and success/error. [`Pager`] accumulates
//! items page by page and tracks whether more pages remain.

pub mod backoff;
pub mod cache;
pub mod error;
pub mod operation;
mod paginated;
mod single;

pub use cache::{CacheEntry, CacheStore, MemoryCache};
pub use error::FetchError;
pub use operation::{fetch_fn, page_fn, FetchOperation, Page, PageOperation};
pub use paginated::{PageConfig, PageEvent, PagePhase, PageSnapshot, Pager};
pub use single::{FetchConfig, FetchEvent, FetchPhase, FetchSnapshot, Fetcher};
