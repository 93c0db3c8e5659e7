//! Frame-level queue for unreliable datagrams carried over a reliable connection.
//!
//! The queue sits between the application and the connection's packet
//! pipelines:
//! - [`OutboundSlot`] holds at most one outbound datagram until the packet
//!   assembler peeks and acknowledges it (backpressure + expiry)
//! - [`InboundBuffer`] buffers received datagrams for the application and
//!   drops new arrivals once full
//! - [`Lifecycle`] is the one-shot shutdown signal both of them observe
//!
//! [`DatagramQueue`] wires the three together for a single connection.

pub mod cancel;
pub mod config;
pub mod error;
pub mod frame;
pub mod inbound;
pub mod lifecycle;
pub mod outbound;
pub mod queue;

mod signal;
mod sync;

pub use cancel::{CancelToken, Cancellation};
pub use config::{QueueConfig, DEFAULT_MAX_PAYLOAD, DEFAULT_RECEIVE_CAPACITY};
pub use error::{CloseReason, DatagramError, Result};
pub use frame::{DatagramFrame, QueuedMessage};
pub use inbound::InboundBuffer;
pub use lifecycle::Lifecycle;
pub use outbound::{OutboundSlot, SendNotifier};
pub use queue::DatagramQueue;
