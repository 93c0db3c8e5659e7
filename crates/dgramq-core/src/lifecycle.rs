use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{CloseReason, DatagramError};
use crate::signal::{Signal, Waker};

/// One-shot shutdown shared by the outbound slot and the inbound buffer.
///
/// The first [`close`](Self::close) stores the terminal error and wakes every
/// blocked submit and receive; later calls are ignored.
pub struct Lifecycle {
    reason: OnceLock<CloseReason>,
    signal: Signal,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            reason: OnceLock::new(),
            signal: Signal::new(),
        }
    }

    /// Close with `err` as the terminal error.
    ///
    /// Returns false (and keeps the first error) if already closed.
    pub fn close<E>(&self, err: E) -> bool
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.close_with(Arc::new(err))
    }

    /// Close with an already shared terminal error.
    pub fn close_with(&self, reason: CloseReason) -> bool {
        if self.reason.set(reason).is_err() {
            debug!("datagram queue already closed, ignoring close");
            return false;
        }
        if let Some(reason) = self.reason.get() {
            debug!(reason = %reason, "closing datagram queue");
        }
        self.signal.fire();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.reason.get().is_some()
    }

    /// The terminal error, once closed.
    pub fn reason(&self) -> Option<CloseReason> {
        self.reason.get().cloned()
    }

    /// The error every blocked or later operation returns, once closed.
    pub fn closed_error(&self) -> Option<DatagramError> {
        self.reason().map(DatagramError::Closed)
    }

    /// Run `waker` when the lifecycle closes (immediately if it already has).
    pub(crate) fn on_close(&self, waker: Waker) {
        self.signal.register_forever(waker);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("reason", &self.reason.get())
            .finish()
    }
}
