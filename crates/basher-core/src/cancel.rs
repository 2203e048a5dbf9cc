//! Cancellation of running interpreters.
//!
//! A [`CancellationToken`] is the only way a run is stopped early. It is
//! cancelled either explicitly or when a [`Deadline`] passes, and the
//! execution engine checks it between completion polls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// A clonable, thread-safe cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token, waking any waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.state.cancelled.lock();
        *cancelled = true;
        self.state.wakeup.notify_all();
    }

    /// Check if the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.state.cancelled.lock()
    }

    /// Block for up to `timeout`, returning early if cancelled.
    ///
    /// Returns whether the token is cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut cancelled = self.state.cancelled.lock();
        if !*cancelled {
            self.state.wakeup.wait_for(&mut cancelled, timeout);
        }
        *cancelled
    }
}

/// A wall-clock deadline for one run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    /// When the run started.
    pub started_at: Instant,
    /// How long the run may take.
    pub timeout: Duration,
}

impl Deadline {
    /// Start a deadline now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            timeout,
        }
    }

    /// Check if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.started_at.elapsed() >= self.timeout
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.started_at.elapsed())
    }
}

/// Why a run was stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The deadline passed.
    Timeout,
    /// The token was cancelled.
    Cancelled,
}

/// Combines a token and an optional deadline for the engine's wait loop.
#[derive(Debug, Clone)]
pub(crate) struct StopCondition {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

impl StopCondition {
    pub(crate) fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(Deadline::after),
        }
    }

    /// Check whether the run should stop now.
    pub(crate) fn check(&self) -> Option<StopReason> {
        if self.token.is_cancelled() {
            return Some(StopReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline.is_expired() => Some(StopReason::Timeout),
            _ => None,
        }
    }

    /// Sleep for one poll interval, cut short by cancellation or the deadline.
    pub(crate) fn pause(&self, interval: Duration) {
        let interval = match self.deadline {
            Some(deadline) => interval.min(deadline.remaining()),
            None => interval,
        };
        if !interval.is_zero() {
            self.token.wait_timeout(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_wait_timeout_wakes_on_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = CancellationToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_deadline() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() <= Duration::from_secs(60));

        let expired = Deadline::after(Duration::ZERO);
        assert!(expired.is_expired());
        assert_eq!(expired.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_stop_condition() {
        let token = CancellationToken::new();
        let condition = StopCondition::new(token.clone(), None);
        assert_eq!(condition.check(), None);

        token.cancel();
        assert_eq!(condition.check(), Some(StopReason::Cancelled));

        let condition = StopCondition::new(CancellationToken::new(), Some(Duration::ZERO));
        assert_eq!(condition.check(), Some(StopReason::Timeout));
    }
}
