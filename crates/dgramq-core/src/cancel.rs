//! Caller-supplied cancellation for blocking receives.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::signal::{Registration, Signal, Waker};

/// A cloneable abort flag that wakes blocked receives when cancelled.
#[derive(Clone)]
pub struct CancelToken {
    signal: Arc<Signal>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            signal: Arc::new(Signal::new()),
        }
    }

    /// Cancel every receive waiting on this token (and every future one).
    pub fn cancel(&self) {
        self.signal.fire();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_fired()
    }

    pub(crate) fn register(&self, waker: Waker) -> Registration<'_> {
        self.signal.register(waker)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// How a blocking receive may be abandoned: a deadline, a token, both, or neither.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Wait until data arrives or the queue closes.
    pub fn never() -> Self {
        Self::default()
    }

    /// Give up at `deadline`.
    pub fn deadline(deadline: Instant) -> Self {
        Self {
            token: None,
            deadline: Some(deadline),
        }
    }

    /// Give up `timeout` from now.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            token: None,
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Give up once `token` is cancelled.
    pub fn token(token: CancelToken) -> Self {
        Self {
            token: Some(token),
            deadline: None,
        }
    }

    /// Add a deadline to an existing cancellation.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Add a token to an existing cancellation.
    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.token.as_ref()
    }

    pub fn deadline_at(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn never_has_no_triggers() {
        let cancel = Cancellation::never();
        assert!(cancel.cancel_token().is_none());
        assert!(cancel.deadline_at().is_none());
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn combined_cancellation() {
        let token = CancelToken::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        let cancel = Cancellation::token(token.clone()).with_deadline(deadline);

        assert_eq!(cancel.deadline_at(), Some(deadline));
        assert!(!cancel.is_cancelled());
        token.cancel();
        assert!(cancel.is_cancelled());
    }
}
