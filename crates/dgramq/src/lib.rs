//! Unreliable datagram queueing for reliable, multiplexed connections.
//!
//! dgramq lets an application send and receive unreliable datagrams over a
//! connection whose packet assembler and parser live elsewhere. Outbound
//! datagrams are handed over one at a time (backpressure, optional expiry);
//! inbound datagrams are buffered up to a fixed capacity and dropped beyond it.
//!
//! # Crate Structure
//!
//! - [`queue`] — outbound slot, inbound buffer, lifecycle and the combined
//!   `DatagramQueue`
//! - async submit/receive behind the `async` feature
//! - the `dgramq` simulation CLI behind the `cli` feature

/// Re-export queue types.
pub mod queue {
    pub use dgramq_core::*;
}

pub use dgramq_core::{Cancellation, DatagramError, DatagramFrame, DatagramQueue, QueueConfig};
