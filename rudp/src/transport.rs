//! Engine-independent send / receive surface

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::stats::EngineStats;
use bytes::Bytes;

/// Result of a successful receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Next in-order payload, possibly empty
    Data(Bytes),
    /// Peer sent FIN
    EndOfStream,
}

impl Delivery {
    /// Payload, `None` at end of stream
    pub fn into_data(self) -> Option<Bytes> {
        match self {
            Delivery::Data(data) => Some(data),
            Delivery::EndOfStream => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Delivery::EndOfStream)
    }
}

/// Reliable byte transport over an established endpoint
pub trait Transport: Send {
    /// Deliver one payload to the peer, returning once it is acknowledged
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Block for the next in-order payload or end of stream
    fn receive(&mut self) -> Result<Delivery>;

    /// Run the FIN teardown
    fn close(&mut self) -> Result<()>;

    fn endpoint(&self) -> &Endpoint;

    /// Stop the engine and give the endpoint back
    fn into_endpoint(self: Box<Self>) -> Endpoint;

    fn stats(&self) -> EngineStats;
}
