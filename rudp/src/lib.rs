//! Reliable UDP
//!
//! Reliable, in-order byte delivery over a lossy datagram channel. An
//! [`Endpoint`] performs the SYN / SYN+ACK / ACK handshake; the
//! [`StopAndWait`] and [`GoBackN`] engines then carry payloads with
//! retransmission until acknowledged, and close with FIN / ACK.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod go_back_n;
pub mod stats;
pub mod stop_and_wait;
pub mod transport;

pub use rudp_io as io;
pub use rudp_protocol as protocol;

pub use config::{ConfigError, RetryConfig, TransportConfig};
pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use go_back_n::GoBackN;
pub use stats::EngineStats;
pub use stop_and_wait::StopAndWait;
pub use transport::{Delivery, Transport};

pub use protocol::{ConnectionState, RetryPolicy};
