use std::time::Duration;

/// Delay before retry attempt `attempt` (1-indexed).
///
/// Linear in the attempt number rather than exponential: retries here
/// are UI-triggered with small bounded counts, so `base * attempt`
/// grows enough to space attempts out without ever waiting long.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    debug_assert!(attempt >= 1, "retry attempts are 1-indexed");
    base * attempt
}
