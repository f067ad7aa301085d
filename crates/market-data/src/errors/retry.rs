/// Classification for retry policy.
///
/// Used by the HTTP fetcher and the provider adapter to decide what to do
/// after a failed provider call.
///
/// # Behavior Summary
///
/// | Class | Retry the same request? | Call the provider again soon? |
/// |-------|-------------------------|-------------------------------|
/// | `Never` | No | Yes (next candidate symbol or next cycle) |
/// | `WithBackoff` | Yes, bounded, exponential delay | Yes |
/// | `Cooldown` | No | Only after the cool-down elapses |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - bad symbol, client error, missing credential, or parse failure.
    /// The request is fundamentally invalid and retrying won't help.
    Never,

    /// Retry with exponential backoff.
    ///
    /// Used for transient failures: 5xx responses, timeouts and transport errors.
    WithBackoff,

    /// The provider signalled a quota or rate limit.
    ///
    /// Never retried immediately. The provider is parked for a cool-down
    /// window and served from cache or last-known-good data meanwhile.
    Cooldown,
}
