//! Streaming Try-Confirm/Cancel order creation.
//!
//! The caller opens a stream, sends an empty freeze handshake, then the
//! order. The coordinator serializes attempts behind an admission lock,
//! freezes the inventory over a second stream, writes the order, sends the
//! stock decrements and emits the order once they are acknowledged.

pub mod coordinator;
pub mod state;
pub mod stream;

pub use coordinator::TccCoordinator;
pub use state::TccState;
pub use stream::{CallerStream, ChannelCallerStream, StreamError, TccClient, TccRequest, channel};
