use std::time::Duration;

use crate::error::{DatagramError, Result};

/// Default inbound buffer capacity (datagrams, not bytes).
pub const DEFAULT_RECEIVE_CAPACITY: usize = 128;

/// Default maximum datagram payload size in bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 16383;

/// Configuration for a [`DatagramQueue`](crate::DatagramQueue).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum number of received datagrams buffered for the application.
    /// Arrivals beyond this are dropped. Default: 128.
    pub receive_capacity: usize,
    /// How long a submitted datagram may wait for the packet assembler.
    /// `None` means datagrams never expire. Default: `None`.
    pub send_timeout: Option<Duration>,
    /// Largest payload accepted by `submit`. Default: 16383 bytes.
    pub max_payload_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            receive_capacity: DEFAULT_RECEIVE_CAPACITY,
            send_timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl QueueConfig {
    /// Override the inbound buffer capacity.
    pub fn with_receive_capacity(mut self, capacity: usize) -> Self {
        self.receive_capacity = capacity;
        self
    }

    /// Override the default send timeout.
    pub fn with_send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Override the maximum accepted payload size.
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Reject settings the queue cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.receive_capacity == 0 {
            return Err(DatagramError::InvalidConfig(
                "receive_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_payload_size == 0 {
            return Err(DatagramError::InvalidConfig(
                "max_payload_size must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout == Some(Duration::ZERO) {
            return Err(DatagramError::InvalidConfig(
                "send_timeout must be greater than zero (use None to disable expiry)".to_string(),
            ));
        }
        Ok(())
    }
}
