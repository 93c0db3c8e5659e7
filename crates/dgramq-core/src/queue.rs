use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::cancel::Cancellation;
use crate::config::QueueConfig;
use crate::error::{CloseReason, Result};
use crate::frame::DatagramFrame;
use crate::inbound::InboundBuffer;
use crate::lifecycle::Lifecycle;
use crate::outbound::{OutboundSlot, SendNotifier};

/// Datagram queue of one connection: outbound slot, inbound buffer and
/// their shared shutdown signal.
///
/// Cloning is cheap and every clone operates on the same queue, so the
/// application, the packet assembler and the frame-delivery path can each
/// hold their own handle.
#[derive(Debug, Clone)]
pub struct DatagramQueue {
    outbound: OutboundSlot,
    inbound: InboundBuffer,
    lifecycle: Arc<Lifecycle>,
}

impl DatagramQueue {
    /// Create a queue with default configuration.
    ///
    /// `notifier` is called whenever a datagram becomes available to send.
    pub fn new<N>(notifier: N) -> Self
    where
        N: SendNotifier + 'static,
    {
        Self::build(Arc::new(notifier), &QueueConfig::default())
    }

    /// Create a queue with explicit configuration.
    pub fn with_config<N>(notifier: N, config: QueueConfig) -> Result<Self>
    where
        N: SendNotifier + 'static,
    {
        config.validate()?;
        Ok(Self::build(Arc::new(notifier), &config))
    }

    fn build(notifier: Arc<dyn SendNotifier>, config: &QueueConfig) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        Self {
            outbound: OutboundSlot::build(Arc::clone(&lifecycle), notifier, config),
            inbound: InboundBuffer::build(Arc::clone(&lifecycle), config.receive_capacity),
            lifecycle,
        }
    }

    /// Send one datagram; see [`OutboundSlot::submit`].
    pub fn submit(&self, frame: impl Into<DatagramFrame>) -> Result<()> {
        self.outbound.submit(frame.into())
    }

    /// Send one datagram with an explicit expiry; see
    /// [`OutboundSlot::submit_with_timeout`].
    pub fn submit_with_timeout(
        &self,
        frame: impl Into<DatagramFrame>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.outbound.submit_with_timeout(frame.into(), timeout)
    }

    /// Receive the next datagram; see [`InboundBuffer::receive`].
    pub fn receive(&self, cancel: &Cancellation) -> Result<Bytes> {
        self.inbound.receive(cancel)
    }

    #[cfg(feature = "async")]
    pub async fn submit_async(&self, frame: impl Into<DatagramFrame>) -> Result<()> {
        self.outbound.submit_async(frame.into()).await
    }

    #[cfg(feature = "async")]
    pub async fn receive_async(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Bytes> {
        self.inbound.receive_async(cancel).await
    }

    /// Packet assembler: look at the next datagram to send.
    pub fn peek(&self) -> Option<DatagramFrame> {
        self.outbound.peek()
    }

    /// Packet assembler: resolve the peeked datagram.
    pub fn acknowledge(&self, status: Result<()>) {
        self.outbound.acknowledge(status)
    }

    /// Frame-delivery path: buffer a received datagram.
    pub fn deliver(&self, payload: &[u8]) {
        self.inbound.deliver(payload)
    }

    /// Owning connection: shut the queue down with a terminal error.
    ///
    /// Only the first call has an effect; returns false for later calls.
    pub fn close<E>(&self, err: E) -> bool
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.lifecycle.close(err)
    }

    /// Like [`close`](Self::close) with a reason shared with other parts of the connection.
    pub fn close_with(&self, reason: CloseReason) -> bool {
        self.lifecycle.close_with(reason)
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    pub fn outbound(&self) -> &OutboundSlot {
        &self.outbound
    }

    pub fn inbound(&self) -> &InboundBuffer {
        &self.inbound
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }
}
