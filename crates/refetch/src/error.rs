use thiserror::Error;

/// Failures surfaced through controller snapshots.
///
/// `send` never returns an error; every failure ends up here, as data
/// in the context, alongside a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch operation failed and no automatic retries were
    /// configured for this request.
    #[error("fetch operation failed: {0}")]
    Operation(String),

    /// The fetch operation kept failing until the retry ceiling was
    /// hit. Recovering requires an explicit `RETRY` or `FETCH`.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    /// A cache backend failed while reading. Never terminal: the
    /// controller treats it as a cache miss and fetches fresh.
    #[error("cache read failed: {0}")]
    CacheRead(String),
}
