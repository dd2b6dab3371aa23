//! Reliable UDP Protocol Core
//!
//! This crate implements the I/O-free parts of the reliable datagram
//! transport: the digest-checked frame codec, modular sequence numbers, the
//! handshake and teardown state machine, the Go-Back-N send window and the
//! retransmission retry policy.

pub mod connection;
pub mod packet;
pub mod retry;
pub mod sequence;
pub mod window;

pub use connection::{Action, Connection, ConnectionError, ConnectionState, Role};
pub use packet::{decode, encode, Flags, Frame, FrameError};
pub use retry::{Retry, RetryExhausted, RetryPolicy};
pub use sequence::{AltBit, SeqSpace};
pub use window::SendWindow;
