//! Transport errors

use crate::config::ConfigError;
use rudp_io::SocketError;
use rudp_protocol::{ConnectionError, RetryExhausted};
use thiserror::Error;

/// Errors surfaced to transport callers
///
/// Simulated loss, corruption and read timeouts never appear here; they are
/// absorbed by retransmission.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("{operation} gave up: {source}")]
    RetriesExhausted {
        operation: &'static str,
        source: RetryExhausted,
    },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No remote peer")]
    NotConnected,

    #[error("Payload of {len} bytes does not fit a {max}-byte datagram")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    /// Adapter for `map_err` on a retry attempt
    pub(crate) fn exhausted(operation: &'static str) -> impl FnOnce(RetryExhausted) -> Self {
        move |source| {
            tracing::warn!(operation, attempts = source.attempts, elapsed = ?source.elapsed, "Retries exhausted");
            TransportError::RetriesExhausted { operation, source }
        }
    }

    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, TransportError::RetriesExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
