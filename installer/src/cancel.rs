//! Cooperative cancellation for acquisitions.
//!
//! A [`CancellationToken`] is cloned into every blocking step. Fetches poll
//! it between chunks of a response body, and the orchestrator polls it
//! between pipeline steps. An optional deadline makes the token report
//! itself cancelled once the instant has passed, and transports shorten
//! each request's timeout to the time left before it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared cancellation flag with an optional deadline.
///
/// Clones observe the same flag, so cancelling any clone cancels all of
/// them.
///
/// # Examples
///
/// ```
/// use tfinstall::cancel::CancellationToken;
///
/// let token = CancellationToken::new();
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token that is never cancelled unless [`Self::cancel`] is
    /// called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that also reports cancellation once `deadline` passes.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// Create a token whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Return whether cancellation was requested or the deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Time left before the deadline, or `None` when the token has no
    /// deadline. Saturates at zero once the deadline has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Bound `timeout` by the time left before the deadline.
    #[must_use]
    pub fn clamp(&self, timeout: Duration) -> Duration {
        self.remaining()
            .map_or(timeout, |remaining| remaining.min(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_active() {
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_cancels() {
        let token = CancellationToken::with_deadline(Instant::now());
        assert!(token.is_cancelled());
    }

    #[test]
    fn future_deadline_is_active() {
        let token = CancellationToken::with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn token_without_deadline_leaves_timeout_alone() {
        let token = CancellationToken::new();
        assert_eq!(token.remaining(), None);
        assert_eq!(token.clamp(Duration::from_secs(120)), Duration::from_secs(120));
    }

    #[test]
    fn near_deadline_shortens_timeout() {
        let token = CancellationToken::with_timeout(Duration::from_secs(5));
        let clamped = token.clamp(Duration::from_secs(120));
        assert!(clamped <= Duration::from_secs(5), "{clamped:?}");
    }

    #[test]
    fn distant_deadline_keeps_timeout() {
        let token = CancellationToken::with_timeout(Duration::from_secs(3600));
        assert_eq!(token.clamp(Duration::from_secs(120)), Duration::from_secs(120));
    }

    #[test]
    fn elapsed_deadline_leaves_no_time() {
        let token = CancellationToken::with_deadline(Instant::now());
        assert_eq!(token.remaining(), Some(Duration::ZERO));
        assert_eq!(token.clamp(Duration::from_secs(120)), Duration::ZERO);
    }
}
