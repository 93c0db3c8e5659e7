use std::time::{Duration, Instant};

use bytes::Bytes;

/// An unreliable datagram frame as seen by the queue.
///
/// The wire encoding belongs to the connection's frame layer; the queue only
/// moves the payload around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramFrame {
    /// The datagram payload.
    pub data: Bytes,
}

impl DatagramFrame {
    /// Create a new frame.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Create a frame over a static payload without copying.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for DatagramFrame {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl From<Vec<u8>> for DatagramFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// A frame waiting in the outbound slot, with its optional expiry.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    frame: DatagramFrame,
    expires_at: Option<Instant>,
}

impl QueuedMessage {
    /// Queue `frame` with an absolute expiry; `None` never expires.
    pub fn new(frame: DatagramFrame, expires_at: Option<Instant>) -> Self {
        Self { frame, expires_at }
    }

    /// Queue `frame` so that it expires `timeout` after `now`.
    pub fn with_timeout(frame: DatagramFrame, timeout: Option<Duration>, now: Instant) -> Self {
        let expires_at = timeout.and_then(|timeout| now.checked_add(timeout));
        Self::new(frame, expires_at)
    }

    pub fn frame(&self) -> &DatagramFrame {
        &self.frame
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns true once `now` is past the expiry.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => deadline < now,
            None => false,
        }
    }

    pub fn into_frame(self) -> DatagramFrame {
        self.frame
    }
}
