use std::sync::Arc;

/// Terminal error handed to [`Lifecycle::close`](crate::Lifecycle::close).
///
/// Every caller that observes the closed queue receives a clone of the same
/// `Arc`, so `Arc::ptr_eq` identifies the exact value passed to `close`.
pub type CloseReason = Arc<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the datagram queue.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DatagramError {
    /// The owning connection closed the queue.
    #[error("datagram queue closed: {0}")]
    Closed(CloseReason),

    /// The datagram was not picked up by the packet assembler before its deadline.
    #[error("datagram queued too long")]
    Expired,

    /// The receive was aborted through its cancel token.
    #[error("receive cancelled")]
    Cancelled,

    /// The receive deadline passed before a datagram arrived.
    #[error("receive deadline exceeded")]
    DeadlineExceeded,

    /// The payload does not fit in a datagram frame.
    #[error("datagram too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// The packet assembler gave up on the datagram.
    #[error("datagram rejected: {0}")]
    Rejected(Arc<dyn std::error::Error + Send + Sync>),

    /// The queue configuration is unusable.
    #[error("invalid queue config: {0}")]
    InvalidConfig(String),
}

impl DatagramError {
    /// Wrap an arbitrary assembler failure as an acknowledge status.
    pub fn rejected<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Rejected(Arc::new(err))
    }

    /// The close reason, if this error reports a closed queue.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        match self {
            Self::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Returns true for errors caused by queue shutdown.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

pub type Result<T> = std::result::Result<T, DatagramError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("application went away")]
    struct AppGone;

    #[test]
    fn closed_keeps_reason_identity() {
        let reason: CloseReason = Arc::new(AppGone);
        let err = DatagramError::Closed(reason.clone());
        let cloned = err.clone();

        assert!(cloned.is_closed());
        assert!(Arc::ptr_eq(cloned.close_reason().unwrap(), &reason));
        assert!(cloned.close_reason().unwrap().downcast_ref::<AppGone>().is_some());
        assert_eq!(err.to_string(), "datagram queue closed: application went away");
    }

    #[test]
    fn rejected_wraps_source() {
        let err = DatagramError::rejected(AppGone);
        assert!(!err.is_closed());
        assert!(err.close_reason().is_none());
        assert_eq!(err.to_string(), "datagram rejected: application went away");
    }

    #[test]
    fn too_large_message() {
        let err = DatagramError::TooLarge { size: 2000, max: 1200 };
        assert_eq!(err.to_string(), "datagram too large (2000 bytes, max 1200)");
    }
}
