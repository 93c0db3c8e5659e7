use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::QueueConfig;
use crate::error::{DatagramError, Result};
use crate::frame::{DatagramFrame, QueuedMessage};
use crate::lifecycle::Lifecycle;
use crate::sync::{lock, wait};

/// Told whenever a datagram becomes available for the packet assembler.
///
/// Called synchronously from `submit`, outside the slot lock. Implementations
/// should only schedule a send attempt, never peek from inside the callback.
pub trait SendNotifier: Send + Sync {
    fn data_available(&self);
}

impl<F> SendNotifier for F
where
    F: Fn() + Send + Sync,
{
    fn data_available(&self) {
        self()
    }
}

struct Resident {
    ticket: u64,
    message: QueuedMessage,
    peeked: bool,
    /// The submitter went away; its outcome is discarded on completion.
    abandoned: bool,
}

#[derive(Default)]
struct SlotState {
    resident: Option<Resident>,
    next_ticket: u64,
    /// Outcomes not yet collected by their submitter, keyed by ticket.
    outcomes: HashMap<u64, Result<()>>,
}

struct SlotShared {
    state: Mutex<SlotState>,
    vacated: Condvar,
    resolved: Condvar,
    #[cfg(feature = "async")]
    changed: tokio::sync::Notify,
}

impl SlotShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::default()),
            vacated: Condvar::new(),
            resolved: Condvar::new(),
            #[cfg(feature = "async")]
            changed: tokio::sync::Notify::new(),
        }
    }

    /// Wake every waiter. Call with the state lock held.
    fn notify_locked(&self) {
        self.vacated.notify_all();
        self.resolved.notify_all();
        #[cfg(feature = "async")]
        self.changed.notify_waiters();
    }
}

/// Single-datagram handoff between the application and the packet assembler.
///
/// `submit` blocks while another datagram is unresolved, so at most one
/// outbound datagram is in flight per connection. The assembler calls
/// [`peek`](Self::peek) when building a packet and
/// [`acknowledge`](Self::acknowledge) once the datagram made it in (or
/// definitively did not). A datagram that is peeked but not acknowledged
/// stays put and is returned again by the next peek.
#[derive(Clone)]
pub struct OutboundSlot {
    shared: Arc<SlotShared>,
    lifecycle: Arc<Lifecycle>,
    notifier: Arc<dyn SendNotifier>,
    send_timeout: Option<Duration>,
    max_payload_size: usize,
}

impl OutboundSlot {
    /// Create a slot with default configuration.
    pub fn new(lifecycle: Arc<Lifecycle>, notifier: Arc<dyn SendNotifier>) -> Self {
        Self::build(lifecycle, notifier, &QueueConfig::default())
    }

    /// Create a slot using the send settings from `config`.
    ///
    /// Fails with [`DatagramError::InvalidConfig`] if `config` does not validate.
    pub fn with_config(
        lifecycle: Arc<Lifecycle>,
        notifier: Arc<dyn SendNotifier>,
        config: &QueueConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(lifecycle, notifier, config))
    }

    /// Caller has validated `config`.
    pub(crate) fn build(
        lifecycle: Arc<Lifecycle>,
        notifier: Arc<dyn SendNotifier>,
        config: &QueueConfig,
    ) -> Self {
        let shared = Arc::new(SlotShared::new());
        let weak = Arc::downgrade(&shared);
        lifecycle.on_close(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                let _state = lock(&shared.state);
                shared.notify_locked();
            }
        }));

        Self {
            shared,
            lifecycle,
            notifier,
            send_timeout: config.send_timeout,
            max_payload_size: config.max_payload_size,
        }
    }

    /// Submit a datagram using the configured send timeout.
    pub fn submit(&self, frame: DatagramFrame) -> Result<()> {
        self.submit_with_timeout(frame, self.send_timeout)
    }

    /// Submit a datagram and block until the packet assembler resolves it.
    ///
    /// Waits for the slot to be free first. Returns the acknowledge status,
    /// [`DatagramError::Expired`] if `timeout` elapsed before a peek served
    /// it, or the close error.
    pub fn submit_with_timeout(
        &self,
        frame: DatagramFrame,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_size(&frame)?;
        let submitted_at = Instant::now();

        let ticket = {
            let mut state = lock(&self.shared.state);
            loop {
                if let Some(err) = self.lifecycle.closed_error() {
                    return Err(err);
                }
                if state.resident.is_none() {
                    break;
                }
                state = wait(&self.shared.vacated, state);
            }
            occupy(&mut state, frame, timeout, submitted_at)
        };

        self.notifier.data_available();

        let mut state = lock(&self.shared.state);
        loop {
            if let Some(outcome) = state.outcomes.remove(&ticket) {
                return outcome;
            }
            if let Some(err) = self.lifecycle.closed_error() {
                return Err(err);
            }
            state = wait(&self.shared.resolved, state);
        }
    }

    /// Async variant of [`submit`](Self::submit).
    #[cfg(feature = "async")]
    pub async fn submit_async(&self, frame: DatagramFrame) -> Result<()> {
        self.submit_async_with_timeout(frame, self.send_timeout)
            .await
    }

    /// Async variant of [`submit_with_timeout`](Self::submit_with_timeout).
    ///
    /// Dropping the future after it took the slot leaves the datagram queued
    /// for the assembler; its outcome is discarded.
    #[cfg(feature = "async")]
    pub async fn submit_async_with_timeout(
        &self,
        frame: DatagramFrame,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_size(&frame)?;
        let submitted_at = Instant::now();

        let ticket = loop {
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            {
                let mut state = lock(&self.shared.state);
                if let Some(err) = self.lifecycle.closed_error() {
                    return Err(err);
                }
                if state.resident.is_none() {
                    break occupy(&mut state, frame, timeout, submitted_at);
                }
            }
            changed.await;
        };
        let _abandon = AbandonOnDrop {
            shared: &self.shared,
            ticket,
        };

        self.notifier.data_available();

        loop {
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            {
                let mut state = lock(&self.shared.state);
                if let Some(outcome) = state.outcomes.remove(&ticket) {
                    return outcome;
                }
                if let Some(err) = self.lifecycle.closed_error() {
                    return Err(err);
                }
            }
            changed.await;
        }
    }

    /// Look at the pending datagram without removing it (non-blocking).
    ///
    /// An expired datagram is resolved with [`DatagramError::Expired`] and
    /// `None` is returned in its place. After close this always returns `None`.
    pub fn peek(&self) -> Option<DatagramFrame> {
        let mut state = lock(&self.shared.state);
        if self.lifecycle.is_closed() {
            state.resident = None;
            return None;
        }

        let resident = state.resident.as_mut()?;
        if !resident.message.is_expired(Instant::now()) {
            resident.peeked = true;
            return Some(resident.message.frame().clone());
        }

        debug!(
            ticket = resident.ticket,
            len = resident.message.frame().len(),
            "discarding expired datagram"
        );
        self.complete(&mut state, Err(DatagramError::Expired));
        None
    }

    /// Resolve the datagram returned by the last [`peek`](Self::peek).
    ///
    /// `Ok(())` means the datagram was handed to transmission. Frees the slot
    /// and wakes the submitter with `status`.
    ///
    /// # Panics
    ///
    /// Panics if no datagram is currently peeked. That is a bug in the
    /// caller's use of the peek/acknowledge protocol.
    pub fn acknowledge(&self, status: Result<()>) {
        let mut state = lock(&self.shared.state);
        let peeked = state
            .resident
            .as_ref()
            .filter(|resident| resident.peeked)
            .map(|resident| resident.ticket);
        let Some(ticket) = peeked else {
            drop(state);
            panic!("datagram queue BUG: acknowledge called without a peeked datagram");
        };
        trace!(ticket, ok = status.is_ok(), "datagram acknowledged");
        self.complete(&mut state, status);
    }

    /// Returns true while a datagram occupies the slot.
    pub fn is_pending(&self) -> bool {
        lock(&self.shared.state).resident.is_some()
    }

    #[cfg(all(test, feature = "async"))]
    fn parked_outcomes(&self) -> usize {
        lock(&self.shared.state).outcomes.len()
    }

    /// The send timeout applied by [`submit`](Self::submit).
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout
    }

    fn check_size(&self, frame: &DatagramFrame) -> Result<()> {
        if frame.len() > self.max_payload_size {
            return Err(DatagramError::TooLarge {
                size: frame.len(),
                max: self.max_payload_size,
            });
        }
        Ok(())
    }

    fn complete(&self, state: &mut MutexGuard<'_, SlotState>, outcome: Result<()>) {
        if let Some(resident) = state.resident.take() {
            // Nobody collects outcomes once closed: submitters return the close error.
            if !self.lifecycle.is_closed() && !resident.abandoned {
                state.outcomes.insert(resident.ticket, outcome);
            }
            self.shared.notify_locked();
        }
    }
}

fn occupy(
    state: &mut SlotState,
    frame: DatagramFrame,
    timeout: Option<Duration>,
    submitted_at: Instant,
) -> u64 {
    let ticket = state.next_ticket;
    state.next_ticket = state.next_ticket.wrapping_add(1);
    trace!(ticket, len = frame.len(), "datagram queued");
    state.resident = Some(Resident {
        ticket,
        message: QueuedMessage::with_timeout(frame, timeout, submitted_at),
        peeked: false,
        abandoned: false,
    });
    ticket
}

/// Held by an async submit once it owns a ticket. If the future is dropped
/// before collecting its outcome, the outcome is discarded instead of parked.
#[cfg(feature = "async")]
struct AbandonOnDrop<'a> {
    shared: &'a SlotShared,
    ticket: u64,
}

#[cfg(feature = "async")]
impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.shared.state);
        state.outcomes.remove(&self.ticket);
        if let Some(resident) = state.resident.as_mut() {
            if resident.ticket == self.ticket {
                resident.abandoned = true;
            }
        }
    }
}

impl fmt::Debug for OutboundSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundSlot")
            .field("pending", &self.is_pending())
            .field("send_timeout", &self.send_timeout)
            .field("max_payload_size", &self.max_payload_size)
            .field("closed", &self.lifecycle.is_closed())
            .finish()
    }
}
