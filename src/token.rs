use crate::sync::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;

const PENDING: u8 = 0;
const SATISFIED: u8 = 1;

/// State of a [`DependencyToken`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// The producing task has not completed.
    Pending,
    /// The producing task completed and published its output.
    Satisfied,
}

/// Error returned when a token is satisfied more than once.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TokenError {
    /// The token was already satisfied by an earlier call.
    #[error("dependency token already satisfied")]
    AlreadySatisfied,
}

/// One-shot flag published by a task when its output becomes readable.
///
/// Satisfying is a release compare-and-set from pending to satisfied, so
/// everything the producer wrote before the call happens-before any reader
/// that observes [`TokenState::Satisfied`] through [`DependencyToken::state`].
#[derive(Debug)]
#[repr(align(64))]
pub struct DependencyToken {
    state: AtomicU8,
}

impl Default for DependencyToken {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyToken {
    /// New token in the pending state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    /// Move the token from pending to satisfied.
    ///
    /// # Errors
    /// [`TokenError::AlreadySatisfied`] if the token was satisfied before;
    /// the token is left unchanged.
    pub fn satisfy(&self) -> Result<(), TokenError> {
        self.state
            .compare_exchange(PENDING, SATISFIED, Ordering::Release, Ordering::Relaxed)
            .map(drop)
            .map_err(|_| TokenError::AlreadySatisfied)
    }

    /// Current state, read with acquire ordering.
    pub fn state(&self) -> TokenState {
        match self.state.load(Ordering::Acquire) {
            PENDING => TokenState::Pending,
            _ => TokenState::Satisfied,
        }
    }

    /// Shorthand for `state() == TokenState::Satisfied`.
    pub fn is_satisfied(&self) -> bool {
        self.state() == TokenState::Satisfied
    }
}

/// Cooperative stop signal for a run.
///
/// Once cancelled, the executor dispatches no further tasks. Tasks already
/// running finish normally. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// New, not yet cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`CancelToken::cancel`] was called on this token or a clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;

    #[test]
    fn satisfies_exactly_once() {
        let token = DependencyToken::new();
        assert_eq!(token.state(), TokenState::Pending);
        assert_eq!(token.satisfy(), Ok(()));
        assert!(token.is_satisfied());
        assert_eq!(token.satisfy(), Err(TokenError::AlreadySatisfied));
        assert_eq!(token.state(), TokenState::Satisfied);
    }

    #[test]
    fn concurrent_satisfaction_has_one_winner() {
        let token = DependencyToken::new();
        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| token.satisfy().is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|won| *won)
                .count()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
