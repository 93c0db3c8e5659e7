use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::cancel::Cancellation;
use crate::config::QueueConfig;
use crate::error::{DatagramError, Result};
use crate::lifecycle::Lifecycle;
use crate::signal::Waker;
use crate::sync::{lock, wait, wait_timeout};

struct InboundShared {
    queue: Mutex<VecDeque<Bytes>>,
    arrived: Condvar,
    dropped: AtomicU64,
    #[cfg(feature = "async")]
    changed: tokio::sync::Notify,
}

impl InboundShared {
    /// Wake every receiver. Call with the queue lock held.
    fn notify_locked(&self) {
        self.arrived.notify_all();
        #[cfg(feature = "async")]
        self.changed.notify_waiters();
    }
}

fn wake_receivers(shared: &Arc<InboundShared>) -> Waker {
    let weak = Arc::downgrade(shared);
    Arc::new(move || {
        if let Some(shared) = weak.upgrade() {
            let _queue = lock(&shared.queue);
            shared.notify_locked();
        }
    })
}

/// Bounded FIFO of received datagrams waiting for the application.
///
/// The frame-delivery path calls [`deliver`](Self::deliver), which never
/// blocks: once the buffer holds `capacity` datagrams, new arrivals are
/// dropped. Unreliable datagrams have no flow control back to the sender.
#[derive(Clone)]
pub struct InboundBuffer {
    shared: Arc<InboundShared>,
    lifecycle: Arc<Lifecycle>,
    capacity: usize,
}

impl InboundBuffer {
    /// Create a buffer holding at most `capacity` datagrams.
    ///
    /// Fails with [`DatagramError::InvalidConfig`] for a zero capacity.
    pub fn new(lifecycle: Arc<Lifecycle>, capacity: usize) -> Result<Self> {
        Self::with_config(
            lifecycle,
            &QueueConfig::default().with_receive_capacity(capacity),
        )
    }

    /// Create a buffer sized by `config.receive_capacity`.
    pub fn with_config(lifecycle: Arc<Lifecycle>, config: &QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(lifecycle, config.receive_capacity))
    }

    /// Caller has validated `capacity`.
    pub(crate) fn build(lifecycle: Arc<Lifecycle>, capacity: usize) -> Self {
        let shared = Arc::new(InboundShared {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            arrived: Condvar::new(),
            dropped: AtomicU64::new(0),
            #[cfg(feature = "async")]
            changed: tokio::sync::Notify::new(),
        });
        lifecycle.on_close(wake_receivers(&shared));

        Self {
            shared,
            lifecycle,
            capacity,
        }
    }

    /// Hand a received datagram payload to the application.
    ///
    /// The payload is copied; the caller may reuse its buffer afterwards.
    /// Dropped (with a debug event) if the buffer is full or closed.
    pub fn deliver(&self, payload: &[u8]) {
        if self.lifecycle.is_closed() {
            trace!(len = payload.len(), "discarding datagram, queue closed");
            return;
        }

        let data = Bytes::copy_from_slice(payload);
        let queued = {
            let mut queue = lock(&self.shared.queue);
            if queue.len() < self.capacity {
                queue.push_back(data);
                self.shared.notify_locked();
                true
            } else {
                false
            }
        };

        if !queued {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                len = payload.len(),
                capacity = self.capacity,
                "discarding datagram, receive queue full"
            );
        }
    }

    /// Take the oldest buffered datagram, blocking until one arrives.
    ///
    /// Buffered datagrams are returned even after close. With an empty buffer
    /// this returns the close error, [`DatagramError::Cancelled`] once the
    /// cancel token fires, or [`DatagramError::DeadlineExceeded`] once the
    /// deadline passes. Cancellation never consumes a datagram.
    pub fn receive(&self, cancel: &Cancellation) -> Result<Bytes> {
        let _registration = cancel
            .cancel_token()
            .map(|token| token.register(wake_receivers(&self.shared)));

        let mut queue = lock(&self.shared.queue);
        loop {
            if let Some(data) = queue.pop_front() {
                return Ok(data);
            }
            if let Some(err) = self.lifecycle.closed_error() {
                return Err(err);
            }
            if cancel.is_cancelled() {
                return Err(DatagramError::Cancelled);
            }
            match cancel.deadline_at() {
                None => queue = wait(&self.shared.arrived, queue),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DatagramError::DeadlineExceeded);
                    }
                    queue = wait_timeout(&self.shared.arrived, queue, deadline - now);
                }
            }
        }
    }

    /// Async variant of [`receive`](Self::receive), cancelled through a tokio token.
    #[cfg(feature = "async")]
    pub async fn receive_async(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Bytes> {
        loop {
            let changed = self.shared.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            {
                let mut queue = lock(&self.shared.queue);
                if let Some(data) = queue.pop_front() {
                    return Ok(data);
                }
                if let Some(err) = self.lifecycle.closed_error() {
                    return Err(err);
                }
            }
            tokio::select! {
                _ = &mut changed => {}
                _ = cancel.cancelled() => return Err(DatagramError::Cancelled),
            }
        }
    }

    /// Take the oldest buffered datagram without blocking.
    pub fn try_receive(&self) -> Option<Bytes> {
        lock(&self.shared.queue).pop_front()
    }

    /// Number of buffered datagrams.
    pub fn len(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Datagrams discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for InboundBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .field("closed", &self.lifecycle.is_closed())
            .finish()
    }
}
