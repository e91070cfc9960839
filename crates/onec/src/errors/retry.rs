/// Classification for retry policy.
///
/// Used by the client's request loop to decide whether another attempt
/// is worth making.
///
/// | Class | Retry? | Backoff? |
/// |-------|--------|----------|
/// | `Never` | No | - |
/// | `WithBackoff` | Yes, while attempts remain | `base * 2^attempt` |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - credentials rejected, request rejected, or retries
    /// already exhausted.
    Never,

    /// Transient failure (timeout, refused connection, DNS, 502/503/504).
    /// Retry after an exponential delay.
    WithBackoff,
}
